pub mod categories;
pub mod events;
pub mod inventory;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod users;

pub use categories::Entity as Categories;
pub use events::Entity as Events;
pub use inventory::Entity as Inventory;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use products::Entity as Products;
pub use reviews::Entity as Reviews;
pub use users::Entity as Users;
