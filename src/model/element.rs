use crate::BlockNumber;
use crate::ElementId;

/// the kind of operation a block summary describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum OperatorKind {
    BufferRead = 1,
    BufferWrite = 2,
    BufferReadWrite = 3,
    BufferUnknown = 4,
    IntegerMayOverflow = 5,
    IntegerUnknown = 6,
    CastUnsafe = 7,
    CastUnknown = 8,
    PassThrough = 9,
}

impl OperatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BufferRead => "buffer_read",
            Self::BufferWrite => "buffer_write",
            Self::BufferReadWrite => "buffer_read_write",
            Self::BufferUnknown => "buffer_unknown",
            Self::IntegerMayOverflow => "integer_may_overflow",
            Self::IntegerUnknown => "integer_unknown",
            Self::CastUnsafe => "cast_unsafe",
            Self::CastUnknown => "cast_unknown",
            Self::PassThrough => "pass_through",
        }
    }

    /// scoring weight of reaching this operation. a function call with the
    /// variable passed through is the most interesting target of all.
    pub fn weight(&self) -> u32 {
        match self {
            Self::PassThrough => 10,
            Self::BufferWrite => 7,
            Self::BufferRead | Self::BufferReadWrite => 3,
            Self::BufferUnknown => 2,
            Self::IntegerMayOverflow | Self::IntegerUnknown => 2,
            Self::CastUnsafe => 2,
            Self::CastUnknown => 1,
        }
    }
}

impl From<OperatorKind> for u8 {
    fn from(op: OperatorKind) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for OperatorKind {
    type Error = u8;
    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(Self::BufferRead),
            2 => Ok(Self::BufferWrite),
            3 => Ok(Self::BufferReadWrite),
            4 => Ok(Self::BufferUnknown),
            5 => Ok(Self::IntegerMayOverflow),
            6 => Ok(Self::IntegerUnknown),
            7 => Ok(Self::CastUnsafe),
            8 => Ok(Self::CastUnknown),
            9 => Ok(Self::PassThrough),
            x => Err(x),
        }
    }
}

/// the type class of the variable behind a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TypeKind {
    Integer = 1,
    Buffer = 2,
    Struct = 3,
    Unknown = 4,
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Buffer => "buffer",
            Self::Struct => "struct",
            Self::Unknown => "unknown",
        }
    }
}

impl From<TypeKind> for u8 {
    fn from(ty: TypeKind) -> u8 {
        ty as u8
    }
}

impl TryFrom<u8> for TypeKind {
    type Error = u8;
    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(Self::Integer),
            2 => Ok(Self::Buffer),
            3 => Ok(Self::Struct),
            4 => Ok(Self::Unknown),
            x => Err(x),
        }
    }
}

/// a translation unit registered by the rewriter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceElement {
    pub id: ElementId,
    pub path: String,
    pub functions: Vec<ElementId>,
}

/// a function inside a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionElement {
    pub id: ElementId,
    pub source: ElementId,
    pub name: String,
    pub blocks: Vec<ElementId>,
}

/// a basic block inside a function. `number` is the CFG-internal block
/// number; `id` is the dense store-wide element id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockElement {
    pub id: ElementId,
    pub function: ElementId,
    pub number: BlockNumber,
    pub predecessors: Vec<ElementId>,
    pub summaries: Vec<ElementId>,
}

/// an operation summary (goal) attached to a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryElement {
    pub id: ElementId,
    pub block: ElementId,
    pub op: OperatorKind,
    pub ty: TypeKind,
}

/// the unit of the model store. parent references form a tree: summaries
/// hang off blocks, blocks off functions, functions off sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Source(SourceElement),
    Function(FunctionElement),
    Block(BlockElement),
    Summary(SummaryElement),
}

impl Element {
    pub fn id(&self) -> ElementId {
        match self {
            Self::Source(e) => e.id,
            Self::Function(e) => e.id,
            Self::Block(e) => e.id,
            Self::Summary(e) => e.id,
        }
    }

    pub fn parent(&self) -> ElementId {
        match self {
            Self::Source(_) => crate::ERROR_ID,
            Self::Function(e) => e.source,
            Self::Block(e) => e.function,
            Self::Summary(e) => e.block,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Function(_) => "function",
            Self::Block(_) => "block",
            Self::Summary(_) => "goal",
        }
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(e) => write!(f, "<source #{} {}>", e.id, e.path),
            Self::Function(e) => {
                write!(f, "<function #{} {} blocks={}>", e.id, e.name, e.blocks.len())
            }
            Self::Block(e) => write!(f, "<block #{} cfg={}>", e.id, e.number),
            Self::Summary(e) => {
                write!(f, "<goal #{} {} {}>", e.id, e.ty.name(), e.op.name())
            }
        }
    }
}
