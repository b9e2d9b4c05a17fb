//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod vendor;
pub mod payout;
pub mod checkout;

pub use product::{Product, ProductDraft, ProductError, ProductStatus};
pub use order::{Order, OrderError, OrderStatus, LineItem};
pub use cart::{Cart, CartError, CartItem, CartTotals, PricingPolicy};
pub use vendor::{AccountStatus, Vendor};
pub use payout::{Payout, PayoutError, PayoutPeriod, PayoutStatus};
pub use checkout::{Checkout, CheckoutDetails, CheckoutStatus};
