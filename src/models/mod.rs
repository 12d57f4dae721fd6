pub mod category;
pub mod contact;
pub mod toast;

pub use category::{Category, CategoryColor, UNCATEGORIZED_NAME};
pub use contact::{Contact, ContactInput};
pub use toast::{ToastKind, ToastMessage};
