//! SeaORM entity models
//!
//! Database entities for Dossier

mod document;

pub use document::{
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    Entity as DocumentEntity,
    Model as DocumentRow,
};
