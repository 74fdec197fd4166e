// marketplace/src/models/mod.rs

//! Data structures for the checkout and settlement tables, plus the
//! collaborator rows (products, users, addresses) the store reads.

pub mod address;
pub mod cart_item;
pub mod checkout;
pub mod gateway_event;
pub mod ledger;
pub mod money;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod processed_event;
pub mod product;
pub mod timeline;
pub mod user;

pub use address::{Address, AddressSnapshot};
pub use cart_item::CartLine;
pub use checkout::{BuyerIdentity, CheckoutRequest, CheckoutSummary};
pub use gateway_event::{EventKind, GatewayEvent, IntentObject};
pub use ledger::{LedgerTransaction, SellerBalance};
pub use order::{Order, OrderStatus, PaymentStatus};
pub use order_item::OrderItem;
pub use payment::{PaymentIntentLink, PaymentIntentRecord};
pub use processed_event::{ClaimOutcome, EventStatus, ProcessedEvent};
pub use product::Product;
pub use timeline::OrderTimelineEntry;
pub use user::UserContact;
