use super::ast::CastStyle;
use super::ast::ExprKind;
use super::ast::FunctionAst;
use super::ast::NodeId;
use super::ast::UnaryOp;
use crate::BlockNumber;
use crate::model::OperatorKind;
use crate::model::TypeKind;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// one operation summary emitted for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub op: OperatorKind,
    pub ty: TypeKind,
    pub block: BlockNumber,
}

/// CFG block number -> summaries, in first-emission order
pub type BlockSummaries = BTreeMap<BlockNumber, Vec<Operation>>;

/// walks every variable reference of a function and tags the enclosing
/// CFG block with what the reference is used for. the interesting uses
/// become goals the fuzzer steers toward.
#[derive(Default)]
pub struct Classifier {
    operations: Vec<Operation>,
    seen: BTreeSet<(BlockNumber, OperatorKind, TypeKind, NodeId)>,
}

impl Classifier {
    pub fn classify(ast: &FunctionAst) -> BlockSummaries {
        let mut classifier = Self::default();
        classifier.run(ast);
        let mut summaries = BlockSummaries::new();
        for operation in classifier.operations {
            summaries
                .entry(operation.block)
                .or_default()
                .push(operation);
        }
        summaries
    }

    fn run(&mut self, ast: &FunctionAst) {
        if ast.is_skippable() {
            return;
        }
        if ast.is_lambda() {
            log::info!("no goals in lambdas yet: {}", ast.name);
            return;
        }
        let parents = ast.parents();
        for reference in ast.references() {
            let variable = match &ast.exprs[reference].kind {
                ExprKind::Ref(variable) => *variable,
                _ => continue,
            };
            let class = match ast.variables.get(variable) {
                Some(declared) => declared.ty.class(),
                None => {
                    log::info!("reference to unparseable variable in {}", ast.name);
                    continue;
                }
            };
            if class == TypeKind::Unknown {
                continue;
            }
            let top = containing_expr(reference, &parents);
            self.visit(ast, class, top, reference, &parents);
        }
    }

    /// each (block, operator, type, location) tuple is emitted once
    fn emit(&mut self, op: OperatorKind, ty: TypeKind, block: BlockNumber, location: NodeId) {
        if self.seen.insert((block, op, ty, location)) {
            self.operations.push(Operation { op, ty, block });
        }
    }
}

// per-class dispatch over the enclosing expression kind
impl Classifier {
    fn visit(
        &mut self,
        ast: &FunctionAst,
        class: TypeKind,
        node: NodeId,
        reference: NodeId,
        parents: &[Option<NodeId>],
    ) {
        match class {
            TypeKind::Integer => self.integer_use(ast, node, reference, parents),
            TypeKind::Buffer => self.buffer_use(ast, node, reference, parents),
            TypeKind::Struct => self.struct_use(ast, node, reference, parents),
            TypeKind::Unknown => {}
        }
    }

    /// operations that can lead to a wrap-around
    fn integer_use(
        &mut self,
        ast: &FunctionAst,
        node: NodeId,
        reference: NodeId,
        parents: &[Option<NodeId>],
    ) {
        let block = ast.exprs[node].block;
        match &ast.exprs[node].kind {
            ExprKind::Call { .. } => {
                // a value escaping into a call is unconditionally interesting
                self.emit(OperatorKind::PassThrough, TypeKind::Integer, block, node);
            }
            ExprKind::Binary { .. } => {
                self.binary_use(ast, TypeKind::Integer, node, reference, parents)
            }
            ExprKind::Unary { .. } => self.unary_use(ast, TypeKind::Integer, node),
            ExprKind::ExplicitCast { .. } => {
                self.emit(OperatorKind::CastUnknown, TypeKind::Integer, block, reference);
            }
            ExprKind::ImplicitCast { .. } | ExprKind::Paren { .. } => {
                self.integer_use(ast, unroll(ast, node), reference, parents);
            }
            ExprKind::Subscript { base, .. } => {
                if is_within(parents, *base, reference) {
                    self.emit(
                        OperatorKind::IntegerMayOverflow,
                        TypeKind::Integer,
                        block,
                        reference,
                    );
                }
            }
            kind => log::info!("unhandled integer use: {:?}", kind),
        }
    }

    /// pointer arithmetic and casts
    fn buffer_use(
        &mut self,
        ast: &FunctionAst,
        node: NodeId,
        reference: NodeId,
        parents: &[Option<NodeId>],
    ) {
        let block = ast.exprs[node].block;
        match &ast.exprs[node].kind {
            ExprKind::Call { .. } => {
                self.emit(OperatorKind::PassThrough, TypeKind::Buffer, block, node);
            }
            ExprKind::ExplicitCast { style, .. } => {
                let op = match style {
                    CastStyle::CStyle | CastStyle::Reinterpret => OperatorKind::CastUnsafe,
                    CastStyle::Other => OperatorKind::CastUnknown,
                };
                self.emit(op, TypeKind::Buffer, block, reference);
            }
            ExprKind::Binary { .. } => {
                self.binary_use(ast, TypeKind::Buffer, node, reference, parents)
            }
            ExprKind::Unary { .. } => self.unary_use(ast, TypeKind::Buffer, node),
            ExprKind::Subscript { base, .. } => {
                if is_within(parents, *base, reference) {
                    self.emit(
                        OperatorKind::BufferUnknown,
                        TypeKind::Buffer,
                        block,
                        reference,
                    );
                }
            }
            ExprKind::ImplicitCast { .. } | ExprKind::Paren { .. } => {
                self.buffer_use(ast, unroll(ast, node), reference, parents);
            }
            kind => log::info!("unhandled buffer use: {:?}", kind),
        }
    }

    /// for structs only the weird casts matter. cast summaries keep the
    /// buffer type so the scoring table stays two-axis.
    fn struct_use(
        &mut self,
        ast: &FunctionAst,
        node: NodeId,
        reference: NodeId,
        parents: &[Option<NodeId>],
    ) {
        let block = ast.exprs[node].block;
        match &ast.exprs[node].kind {
            ExprKind::Call { .. } => {
                self.emit(OperatorKind::PassThrough, TypeKind::Struct, block, node);
            }
            ExprKind::ExplicitCast { style, .. } => {
                let op = match style {
                    CastStyle::CStyle | CastStyle::Reinterpret => OperatorKind::CastUnsafe,
                    CastStyle::Other => OperatorKind::CastUnknown,
                };
                self.emit(op, TypeKind::Buffer, block, reference);
            }
            ExprKind::ImplicitCast { .. } | ExprKind::Paren { .. } => {
                self.struct_use(ast, unroll(ast, node), reference, parents);
            }
            kind => log::info!("unhandled struct use: {:?}", kind),
        }
    }

    fn binary_use(
        &mut self,
        ast: &FunctionAst,
        class: TypeKind,
        node: NodeId,
        reference: NodeId,
        parents: &[Option<NodeId>],
    ) {
        let block = ast.exprs[node].block;
        let (op, lhs, rhs) = match &ast.exprs[node].kind {
            ExprKind::Binary { op, lhs, rhs } => (*op, *lhs, *rhs),
            _ => return,
        };
        let unknown = match class {
            TypeKind::Integer => OperatorKind::IntegerUnknown,
            _ => OperatorKind::BufferUnknown,
        };
        if op.is_compound_assignment() {
            // only the left-hand side of a compound assignment mutates
            if is_within(parents, lhs, reference) {
                self.emit(unknown, class, block, node);
            } else {
                log::info!("skipped compound assignment with reference on the rhs");
            }
        } else if op.is_arithmetic_or_shift() {
            self.emit(unknown, class, block, node);
        } else {
            // logical and comparison operators are transparent: classify
            // against the operand on the other side of the reference
            let side = if is_within(parents, lhs, reference) {
                rhs
            } else {
                lhs
            };
            self.visit(ast, class, unroll(ast, side), reference, parents);
        }
    }

    fn unary_use(&mut self, ast: &FunctionAst, class: TypeKind, node: NodeId) {
        let block = ast.exprs[node].block;
        let op = match &ast.exprs[node].kind {
            ExprKind::Unary { op, .. } => *op,
            _ => return,
        };
        let unknown = match class {
            TypeKind::Integer => OperatorKind::IntegerUnknown,
            _ => OperatorKind::BufferUnknown,
        };
        if op.is_step() || op == UnaryOp::BitNot {
            self.emit(unknown, class, block, node);
        } else if op == UnaryOp::Deref {
            let op = match class {
                TypeKind::Buffer => OperatorKind::BufferRead,
                _ => OperatorKind::BufferUnknown,
            };
            self.emit(op, class, block, node);
        } else {
            log::info!("unhandled unary operation: {:?}", op);
        }
    }
}

/// the largest enclosing expression of a reference
fn containing_expr(node: NodeId, parents: &[Option<NodeId>]) -> NodeId {
    let mut current = node;
    while let Some(parent) = parents[current] {
        current = parent;
    }
    current
}

/// whether `node` sits inside the subtree rooted at `root`
fn is_within(parents: &[Option<NodeId>], root: NodeId, node: NodeId) -> bool {
    let mut current = node;
    loop {
        if current == root {
            return true;
        }
        match parents[current] {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// strip implicit casts and parentheses
fn unroll(ast: &FunctionAst, node: NodeId) -> NodeId {
    let mut current = node;
    loop {
        match &ast.exprs[current].kind {
            ExprKind::ImplicitCast { operand } | ExprKind::Paren { operand } => current = *operand,
            _ => return current,
        }
    }
}
