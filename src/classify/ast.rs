use crate::BlockNumber;
use crate::model::TypeKind;

/// index into a function's expression table
pub type NodeId = usize;
/// index into a function's variable table
pub type VarId = usize;

/// what the pointee of a pointer-typed variable looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointee {
    Scalar,
    Void,
    Pointer,
    Struct,
    /// struct of unknown shape, or anything else we cannot classify
    Opaque,
}

/// the declared type of a variable, as the front-end hands it over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Integer,
    Array,
    Pointer(Pointee),
    Other,
}

impl VarType {
    /// collapse the declared type into the four summary classes
    pub fn class(&self) -> TypeKind {
        match self {
            Self::Integer => TypeKind::Integer,
            Self::Array => TypeKind::Buffer,
            Self::Pointer(Pointee::Scalar | Pointee::Void | Pointee::Pointer) => TypeKind::Buffer,
            Self::Pointer(Pointee::Struct) => TypeKind::Struct,
            Self::Pointer(Pointee::Opaque) => TypeKind::Unknown,
            Self::Other => TypeKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub ty: VarType,
}

/// explicit cast flavors; the unsafe ones defeat the type system outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastStyle {
    CStyle,
    Reinterpret,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalOr,
    Assign,
    MulAssign,
    DivAssign,
    RemAssign,
    AddAssign,
    SubAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    XorAssign,
    OrAssign,
}

impl BinaryOp {
    pub fn is_compound_assignment(&self) -> bool {
        matches!(
            self,
            Self::MulAssign
                | Self::DivAssign
                | Self::RemAssign
                | Self::AddAssign
                | Self::SubAssign
                | Self::ShlAssign
                | Self::ShrAssign
                | Self::AndAssign
                | Self::XorAssign
                | Self::OrAssign
        )
    }

    /// the non-logical arithmetic and shift operators
    pub fn is_arithmetic_or_shift(&self) -> bool {
        matches!(
            self,
            Self::Mul | Self::Div | Self::Rem | Self::Add | Self::Sub | Self::Shl | Self::Shr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    PreIncrement,
    PostIncrement,
    PreDecrement,
    PostDecrement,
    Deref,
    AddressOf,
    BitNot,
    LogicalNot,
    Plus,
    Minus,
}

impl UnaryOp {
    pub fn is_step(&self) -> bool {
        matches!(
            self,
            Self::PreIncrement | Self::PostIncrement | Self::PreDecrement | Self::PostDecrement
        )
    }
}

/// tagged-variant rendition of the front-end's expression nodes; each
/// carries the child indices classification needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// a reference to a variable
    Ref(VarId),
    Call {
        args: Vec<NodeId>,
    },
    ExplicitCast {
        style: CastStyle,
        operand: NodeId,
    },
    ImplicitCast {
        operand: NodeId,
    },
    Paren {
        operand: NodeId,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    Subscript {
        base: NodeId,
        index: NodeId,
    },
    Literal,
}

impl ExprKind {
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Self::Ref(_) | Self::Literal => vec![],
            Self::Call { args } => args.clone(),
            Self::ExplicitCast { operand, .. }
            | Self::ImplicitCast { operand }
            | Self::Paren { operand }
            | Self::Unary { operand, .. } => vec![*operand],
            Self::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Self::Subscript { base, index } => vec![*base, *index],
        }
    }
}

/// one expression node, pinned to the CFG block its statement lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub block: BlockNumber,
}

/// a function as the compiler front-end hands it to the classifier: the
/// variable table, the expression table, and the flags that exclude it
/// from analysis altogether
#[derive(Debug, Clone, Default)]
pub struct FunctionAst {
    pub name: String,
    pub variables: Vec<Variable>,
    pub exprs: Vec<Expr>,
    pub has_body: bool,
    pub synthesized: bool,
    pub pure_virtual: bool,
    pub inline: bool,
    pub lambda: bool,
}

impl FunctionAst {
    pub fn is_skippable(&self) -> bool {
        !self.has_body || self.synthesized || self.pure_virtual || self.inline
    }

    pub fn is_lambda(&self) -> bool {
        self.lambda
    }

    /// parent-index table, built once per function: the upward walk that
    /// replaces the original visitor's parent map
    pub fn parents(&self) -> Vec<Option<NodeId>> {
        let mut parents = vec![None; self.exprs.len()];
        for (node, expr) in self.exprs.iter().enumerate() {
            for child in expr.kind.children() {
                parents[child] = Some(node);
            }
        }
        parents
    }

    /// every Ref node in table order
    pub fn references(&self) -> Vec<NodeId> {
        self.exprs
            .iter()
            .enumerate()
            .filter(|(_, expr)| matches!(expr.kind, ExprKind::Ref(_)))
            .map(|(node, _)| node)
            .collect()
    }
}

/// small builder so tests and the front-end bridge can assemble function
/// tables without tracking indices by hand
#[derive(Default)]
pub struct AstBuilder {
    ast: FunctionAst,
}

impl AstBuilder {
    pub fn function(name: &str) -> Self {
        Self {
            ast: FunctionAst {
                name: name.to_string(),
                has_body: true,
                ..FunctionAst::default()
            },
        }
    }

    pub fn variable(&mut self, name: &str, ty: VarType) -> VarId {
        self.ast.variables.push(Variable {
            name: name.to_string(),
            ty,
        });
        self.ast.variables.len() - 1
    }

    pub fn expr(&mut self, kind: ExprKind, block: BlockNumber) -> NodeId {
        self.ast.exprs.push(Expr { kind, block });
        self.ast.exprs.len() - 1
    }

    pub fn build(self) -> FunctionAst {
        self.ast
    }
}

pub use AstBuilder as Builder;
pub use ExprKind as Kind;
