pub mod ids;
pub mod store;
pub mod toasts;
pub mod view;

pub use store::{ContactStore, ContactsState};
pub use toasts::{ToastQueue, DEFAULT_TOAST_TTL};
pub use view::{filter_and_sort, ContactFilter};
