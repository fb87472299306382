pub mod access;
pub mod activity;
pub mod affiliate;
pub mod attribution;
pub mod brand;
pub mod commission;
pub mod ledger;
pub mod payout;
pub mod rail;
pub mod referral;
#[cfg(test)]
pub mod test_utils;
pub mod user;

pub use access::Access;
pub use activity::Activity;
pub use affiliate::Affiliate;
pub use brand::Brand;
pub use commission::Commission;
pub use ledger::Ledger;
pub use payout::Payout;
pub use referral::Referral;
pub use user::User;
