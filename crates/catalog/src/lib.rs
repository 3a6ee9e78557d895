//! `gemstock-catalog` — jewelry products.

pub mod product;

pub use product::{
    ActivateProduct, ArchiveProduct, CreateProduct, JewelryCategory, Product, ProductCommand,
    ProductEvent, ProductId, ProductStatus, RenameProduct,
};
