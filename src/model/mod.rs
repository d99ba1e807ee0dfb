pub mod cache;
pub mod disk;
pub mod element;
pub mod store;

pub use cache::Lru;
pub use element::BlockElement;
pub use element::Element;
pub use element::FunctionElement;
pub use element::OperatorKind;
pub use element::SourceElement;
pub use element::SummaryElement;
pub use element::TypeKind;
pub use store::Store;
