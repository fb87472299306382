pub mod activity;
pub mod affiliate;
pub mod brand;
pub mod brand_access;
pub mod brand_commission;
pub mod commission_tier;
pub mod genre;
pub mod order;
pub mod payment_method;
pub mod payout;
pub mod payout_allocation;
pub mod platform_referral;
pub mod user;

pub use affiliate::AffiliateStatus;
pub use brand_access::AccessRole;
pub use payout::PayoutStatus;
pub use payout_allocation::AllocationSource;
pub use platform_referral::ReferralStatus;
pub use user::UserRole;
