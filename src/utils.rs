use crate::prelude::*;

/// `123456` cents -> `$1234.56`.
pub fn format_usd(cents: i64) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let abs = cents.unsigned_abs();
  format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

pub fn format_age(since: DateTime) -> String {
  let age = Utc::now().naive_utc() - since;
  format!("{}h {}m", age.num_hours(), age.num_minutes() % 60)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_usd() {
    assert_eq!(format_usd(5500), "$55.00");
    assert_eq!(format_usd(275), "$2.75");
    assert_eq!(format_usd(-5), "-$0.05");
  }
}
