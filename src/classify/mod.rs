pub mod ast;
pub mod classifier;

pub use ast::CastStyle;
pub use ast::Expr;
pub use ast::FunctionAst;
pub use ast::NodeId;
pub use ast::VarType;
pub use ast::Variable;
pub use classifier::Classifier;
pub use classifier::Operation;
