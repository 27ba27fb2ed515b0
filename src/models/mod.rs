mod business;
mod discount_code;
mod listing;
mod payment_attempt;
mod subscription;
mod user;

pub use business::*;
pub use discount_code::*;
pub use listing::*;
pub use payment_attempt::*;
pub use subscription::*;
pub use user::*;
