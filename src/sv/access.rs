//! Brand membership: who may act on a brand and who owns its earnings.
//!
//! Every non-deleted brand has exactly one `owner` row in `brand_access`.
//! All mutations run in one transaction and re-check that count before
//! committing, so no reader can observe zero or two owners.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
  entity::{AccessRole, UserRole, brand, brand_access, user},
  prelude::*,
  sv::{
    activity::{Activity, Event},
    user::{is_unique_violation, normalize_email},
  },
};

/// Effective privilege of an account on one brand, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  User,
  Manager,
  Owner,
  PlatformAdmin,
  SuperAdmin,
}

pub fn has_role_permission(actual: Role, required: Role) -> bool {
  actual >= required
}

impl Role {
  pub fn is_admin(self) -> bool {
    self >= Role::PlatformAdmin
  }
}

impl From<AccessRole> for Role {
  fn from(role: AccessRole) -> Self {
    match role {
      AccessRole::Owner => Role::Owner,
      AccessRole::Manager => Role::Manager,
    }
  }
}

impl From<UserRole> for Role {
  fn from(role: UserRole) -> Self {
    match role {
      UserRole::User => Role::User,
      UserRole::PlatformAdmin => Role::PlatformAdmin,
      UserRole::SuperAdmin => Role::SuperAdmin,
    }
  }
}

impl FromStr for Role {
  type Err = Error;

  /// Accepts any casing and separator: `SUPERADMIN`, `superAdmin`,
  /// `super_admin` and `super-admin` are the same role.
  fn from_str(raw: &str) -> Result<Self> {
    let canonical: String = raw
      .chars()
      .filter(|c| !matches!(c, '_' | '-' | ' '))
      .flat_map(char::to_lowercase)
      .collect();

    match canonical.as_str() {
      "user" => Ok(Role::User),
      "manager" => Ok(Role::Manager),
      "owner" => Ok(Role::Owner),
      "platformadmin" | "admin" => Ok(Role::PlatformAdmin),
      "superadmin" => Ok(Role::SuperAdmin),
      _ => Err(Error::validation(format!("unknown role `{raw}`"))),
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Role::User => "user",
      Role::Manager => "manager",
      Role::Owner => "owner",
      Role::PlatformAdmin => "platform_admin",
      Role::SuperAdmin => "super_admin",
    };
    f.write_str(name)
  }
}

pub struct Access<'a, C = DatabaseConnection> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Access<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  /// Non-deleted brand or `NotFound`.
  pub async fn live_brand(&self, brand_id: i32) -> Result<brand::Model> {
    brand::Entity::find_by_id(brand_id)
      .one(self.db)
      .await?
      .filter(|brand| !brand.is_deleted)
      .ok_or(Error::NotFound("brand"))
  }

  pub async fn access_role(
    &self,
    brand_id: i32,
    email: &str,
  ) -> Result<Option<AccessRole>> {
    let row =
      brand_access::Entity::find_by_id((brand_id, email.to_string()))
        .one(self.db)
        .await?;
    Ok(row.map(|row| row.role))
  }

  /// Platform admins outrank every brand role; everyone else gets the
  /// role their access row grants, or plain `User`.
  pub async fn effective_role(&self, brand_id: i32, email: &str) -> Result<Role> {
    let email = normalize_email(email)?;

    let platform = user::Entity::find()
      .filter(user::Column::Email.eq(&email))
      .one(self.db)
      .await?
      .map(|user| Role::from(user.role))
      .unwrap_or(Role::User);
    if platform.is_admin() {
      return Ok(platform);
    }

    Ok(self.access_role(brand_id, &email).await?.map_or(Role::User, Role::from))
  }

  pub async fn require(
    &self,
    brand_id: i32,
    email: &str,
    required: Role,
  ) -> Result<Role> {
    let role = self.effective_role(brand_id, email).await?;
    if !has_role_permission(role, required) {
      return Err(Error::forbidden(format!("requires {required} on brand")));
    }
    Ok(role)
  }

  pub async fn owner(&self, brand_id: i32) -> Result<Option<brand_access::Model>> {
    Ok(
      brand_access::Entity::find()
        .filter(brand_access::Column::BrandId.eq(brand_id))
        .filter(brand_access::Column::Role.eq(AccessRole::Owner))
        .one(self.db)
        .await?,
    )
  }

  /// Non-deleted brands this account currently owns.
  pub async fn owned_brands(&self, email: &str) -> Result<Vec<brand::Model>> {
    let ids: Vec<i32> = brand_access::Entity::find()
      .select_only()
      .column(brand_access::Column::BrandId)
      .filter(brand_access::Column::UserEmail.eq(email))
      .filter(brand_access::Column::Role.eq(AccessRole::Owner))
      .into_tuple()
      .all(self.db)
      .await?;

    Ok(
      brand::Entity::find()
        .filter(brand::Column::Id.is_in(ids))
        .filter(brand::Column::IsDeleted.eq(false))
        .order_by_asc(brand::Column::Id)
        .all(self.db)
        .await?,
    )
  }

  pub async fn list(
    &self,
    brand_id: i32,
    viewer: &str,
  ) -> Result<Vec<brand_access::Model>> {
    self.live_brand(brand_id).await?;
    self.require(brand_id, viewer, Role::Manager).await?;

    Ok(
      brand_access::Entity::find()
        .filter(brand_access::Column::BrandId.eq(brand_id))
        .order_by_asc(brand_access::Column::CreatedAt)
        .all(self.db)
        .await?,
    )
  }

  /// Public brands are visible to everyone; the rest only to members and
  /// admins. Deleted brands are visible to admins alone.
  pub async fn can_view(
    &self,
    brand: &brand::Model,
    viewer: Option<&str>,
  ) -> Result<bool> {
    if brand.is_public() {
      return Ok(true);
    }
    let Some(viewer) = viewer else {
      return Ok(false);
    };

    let role = self.effective_role(brand.id, viewer).await?;
    Ok(if brand.is_deleted {
      role.is_admin()
    } else {
      has_role_permission(role, Role::Manager)
    })
  }

  async fn ensure_single_owner(&self, brand_id: i32) -> Result<()> {
    let owners = brand_access::Entity::find()
      .filter(brand_access::Column::BrandId.eq(brand_id))
      .filter(brand_access::Column::Role.eq(AccessRole::Owner))
      .count(self.db)
      .await?;

    if owners != 1 {
      error!(brand_id, owners, "ownership invariant violated, rolling back");
      return Err(Error::Internal(format!(
        "brand {brand_id} would have {owners} owners"
      )));
    }
    Ok(())
  }

  async fn insert_row(
    &self,
    brand_id: i32,
    email: &str,
    role: AccessRole,
  ) -> Result<brand_access::Model> {
    brand_access::ActiveModel {
      brand_id: Set(brand_id),
      user_email: Set(email.to_string()),
      role: Set(role),
      created_at: Set(Utc::now().naive_utc()),
    }
    .insert(self.db)
    .await
    .map_err(|err| {
      if is_unique_violation(&err) {
        Error::conflict(format!("{email} already has access"))
      } else {
        err.into()
      }
    })
  }

  async fn set_row_role(
    &self,
    brand_id: i32,
    email: &str,
    role: AccessRole,
  ) -> Result<()> {
    brand_access::Entity::update_many()
      .col_expr(brand_access::Column::Role, sea_orm::sea_query::Expr::value(role))
      .filter(brand_access::Column::BrandId.eq(brand_id))
      .filter(brand_access::Column::UserEmail.eq(email))
      .exec(self.db)
      .await?;
    Ok(())
  }

  /// Demotes the current owner and promotes `to` (inserting or upgrading
  /// their row). Runs on whatever connection `self` holds; callers wrap it
  /// in a transaction. Fails with `Conflict` if `from` no longer owns it.
  async fn swap_owner(&self, brand_id: i32, from: &str, to: &str) -> Result<()> {
    let demoted = brand_access::Entity::update_many()
      .col_expr(
        brand_access::Column::Role,
        sea_orm::sea_query::Expr::value(AccessRole::Manager),
      )
      .filter(brand_access::Column::BrandId.eq(brand_id))
      .filter(brand_access::Column::UserEmail.eq(from))
      .filter(brand_access::Column::Role.eq(AccessRole::Owner))
      .exec(self.db)
      .await?;
    if demoted.rows_affected == 0 {
      return Err(Error::conflict("ownership changed concurrently"));
    }

    match self.access_role(brand_id, to).await? {
      Some(_) => self.set_row_role(brand_id, to, AccessRole::Owner).await?,
      None => {
        self.insert_row(brand_id, to, AccessRole::Owner).await?;
      }
    }
    self.ensure_single_owner(brand_id).await
  }
}

impl<'a, C: ConnectionTrait + TransactionTrait> Access<'a, C> {
  pub async fn grant(
    &self,
    brand_id: i32,
    granter: &str,
    invitee: &str,
    role: AccessRole,
  ) -> Result<brand_access::Model> {
    let granter = normalize_email(granter)?;
    let invitee = normalize_email(invitee)?;
    self.live_brand(brand_id).await?;
    self.require(brand_id, &granter, Role::from(role)).await?;

    if self.access_role(brand_id, &invitee).await?.is_some() {
      return Err(Error::conflict(format!("{invitee} already has access")));
    }

    if role == AccessRole::Owner {
      self.transfer_ownership(brand_id, &granter, &invitee).await?;
    } else {
      let txn = self.db.begin().await?;
      let access = Access::new(&txn);
      access.insert_row(brand_id, &invitee, role).await?;
      Activity::new(&txn)
        .record(Event::AccessGranted {
          brand_id,
          granted_by: granter.clone(),
          user_email: invitee.clone(),
          role,
        })
        .await?;
      txn.commit().await?;
    }

    info!(brand_id, "{granter} granted {role:?} to {invitee}");
    brand_access::Entity::find_by_id((brand_id, invitee))
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("brand access"))
  }

  pub async fn revoke(
    &self,
    brand_id: i32,
    remover: &str,
    target: &str,
  ) -> Result<()> {
    let remover = normalize_email(remover)?;
    let target = normalize_email(target)?;
    self.live_brand(brand_id).await?;

    let target_role = self
      .access_role(brand_id, &target)
      .await?
      .ok_or(Error::NotFound("brand access"))?;
    let actor_role = self.effective_role(brand_id, &remover).await?;

    if !has_role_permission(actor_role, Role::Manager)
      || !has_role_permission(actor_role, target_role.into())
    {
      return Err(Error::forbidden("cannot remove a higher role"));
    }
    if target_role == AccessRole::Owner {
      return Err(Error::conflict("cannot remove the last owner"));
    }

    let txn = self.db.begin().await?;
    brand_access::Entity::delete_by_id((brand_id, target.clone()))
      .exec(&txn)
      .await?;
    Access::new(&txn).ensure_single_owner(brand_id).await?;
    Activity::new(&txn)
      .record(Event::AccessRevoked {
        brand_id,
        revoked_by: remover.clone(),
        user_email: target.clone(),
      })
      .await?;
    txn.commit().await?;

    info!(brand_id, "{remover} revoked access of {target}");
    Ok(())
  }

  /// Moves ownership to `new_owner`; the previous owner stays on as a
  /// manager. `actor` must be the current owner or a platform admin.
  pub async fn transfer_ownership(
    &self,
    brand_id: i32,
    actor: &str,
    new_owner: &str,
  ) -> Result<()> {
    let actor = normalize_email(actor)?;
    let new_owner = normalize_email(new_owner)?;
    self.live_brand(brand_id).await?;
    self.require(brand_id, &actor, Role::Owner).await?;

    let txn = self.db.begin().await?;
    let access = Access::new(&txn);
    let current = access
      .owner(brand_id)
      .await?
      .ok_or_else(|| Error::Internal(format!("brand {brand_id} has no owner")))?;
    if current.user_email == new_owner {
      return Err(Error::conflict("already the owner of this brand"));
    }

    access.swap_owner(brand_id, &current.user_email, &new_owner).await?;
    Activity::new(&txn)
      .record(Event::OwnershipTransferred {
        brand_id,
        actor: actor.clone(),
        from_email: current.user_email.clone(),
        to_email: new_owner.clone(),
      })
      .await?;
    txn.commit().await?;

    info!(
      brand_id,
      "ownership moved from {} to {new_owner} by {actor}", current.user_email
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::test_utils::test_db;

  #[test]
  fn test_role_parsing_is_format_insensitive() {
    for raw in ["SUPERADMIN", "superAdmin", "super_admin", "Super-Admin"] {
      assert_eq!(raw.parse::<Role>().unwrap(), Role::SuperAdmin);
    }
    assert_eq!("platformAdmin".parse::<Role>().unwrap(), Role::PlatformAdmin);
    assert_eq!("OWNER".parse::<Role>().unwrap(), Role::Owner);
    assert!(matches!("root".parse::<Role>(), Err(Error::Validation(_))));
  }

  #[test]
  fn test_role_ordering() {
    assert!(has_role_permission(Role::Owner, Role::Manager));
    assert!(has_role_permission(Role::PlatformAdmin, Role::Owner));
    assert!(!has_role_permission(Role::Manager, Role::Owner));
    assert!(!has_role_permission(Role::User, Role::Manager));
  }

  #[tokio::test]
  async fn test_last_owner_cannot_be_removed() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    let access = Access::new(&db);

    let result = access.revoke(brand.id, "a@shop.io", "a@shop.io").await;
    assert!(matches!(result, Err(Error::Conflict(_))));
    assert_eq!(test_db::owners(&db, brand.id).await, vec!["a@shop.io"]);
  }

  #[tokio::test]
  async fn test_transfer_keeps_exactly_one_owner() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    let access = Access::new(&db);

    access.transfer_ownership(brand.id, "a@shop.io", "b@shop.io").await.unwrap();

    assert_eq!(test_db::owners(&db, brand.id).await, vec!["b@shop.io"]);
    assert_eq!(
      access.access_role(brand.id, "a@shop.io").await.unwrap(),
      Some(AccessRole::Manager)
    );

    // the former owner lost the right to transfer
    let again = access.transfer_ownership(brand.id, "a@shop.io", "a@shop.io").await;
    assert!(matches!(again, Err(Error::Forbidden(_))));
  }

  #[tokio::test]
  async fn test_transfer_to_self_conflicts() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;

    let result = Access::new(&db)
      .transfer_ownership(brand.id, "a@shop.io", "A@shop.io")
      .await;
    assert!(matches!(result, Err(Error::Conflict(_))));
  }

  #[tokio::test]
  async fn test_manager_cannot_remove_owner() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    let access = Access::new(&db);

    access
      .grant(brand.id, "a@shop.io", "m@shop.io", AccessRole::Manager)
      .await
      .unwrap();

    let result = access.revoke(brand.id, "m@shop.io", "a@shop.io").await;
    assert!(matches!(result, Err(Error::Forbidden(_))));

    let result = access
      .grant(brand.id, "m@shop.io", "x@shop.io", AccessRole::Owner)
      .await;
    assert!(matches!(result, Err(Error::Forbidden(_))));
  }

  #[tokio::test]
  async fn test_duplicate_grant_conflicts() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    let access = Access::new(&db);

    access
      .grant(brand.id, "a@shop.io", "m@shop.io", AccessRole::Manager)
      .await
      .unwrap();
    let result = access
      .grant(brand.id, "a@shop.io", "m@shop.io", AccessRole::Manager)
      .await;
    assert!(matches!(result, Err(Error::Conflict(_))));
  }

  #[tokio::test]
  async fn test_racing_grant_insert_conflicts() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    let access = Access::new(&db);

    access.insert_row(brand.id, "m@shop.io", AccessRole::Manager).await.unwrap();
    let lost = access.insert_row(brand.id, "m@shop.io", AccessRole::Manager).await;
    assert!(matches!(lost, Err(Error::Conflict(_))));
  }

  #[tokio::test]
  async fn test_swap_from_stale_owner_conflicts() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    Access::new(&db)
      .transfer_ownership(brand.id, "a@shop.io", "b@shop.io")
      .await
      .unwrap();

    // a second transfer that read `a` as owner before the first committed
    let txn = db.begin().await.unwrap();
    let stale = Access::new(&txn).swap_owner(brand.id, "a@shop.io", "c@shop.io").await;
    txn.rollback().await.unwrap();

    assert!(matches!(stale, Err(Error::Conflict(_))));
    assert_eq!(test_db::owners(&db, brand.id).await, vec!["b@shop.io"]);
  }

  #[tokio::test]
  async fn test_granting_owner_transfers() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    let access = Access::new(&db);

    let row = access
      .grant(brand.id, "a@shop.io", "b@shop.io", AccessRole::Owner)
      .await
      .unwrap();

    assert_eq!(row.role, AccessRole::Owner);
    assert_eq!(test_db::owners(&db, brand.id).await, vec!["b@shop.io"]);
  }

  #[tokio::test]
  async fn test_admin_override() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    test_db::make_admin(&db, "root@shop.io", UserRole::PlatformAdmin).await;
    let access = Access::new(&db);

    access
      .grant(brand.id, "a@shop.io", "m@shop.io", AccessRole::Manager)
      .await
      .unwrap();
    access.revoke(brand.id, "root@shop.io", "m@shop.io").await.unwrap();
    access
      .transfer_ownership(brand.id, "root@shop.io", "c@shop.io")
      .await
      .unwrap();

    assert_eq!(test_db::owners(&db, brand.id).await, vec!["c@shop.io"]);
    assert_eq!(access.list(brand.id, "root@shop.io").await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_visibility_gate() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    test_db::make_admin(&db, "root@shop.io", UserRole::PlatformAdmin).await;
    let access = Access::new(&db);

    let hidden =
      brand::ActiveModel { is_approved: Set(false), ..brand.clone().into() }
        .update(&db)
        .await
        .unwrap();

    assert!(!access.can_view(&hidden, None).await.unwrap());
    assert!(!access.can_view(&hidden, Some("x@shop.io")).await.unwrap());
    assert!(access.can_view(&hidden, Some("a@shop.io")).await.unwrap());
    assert!(access.can_view(&hidden, Some("root@shop.io")).await.unwrap());

    let deleted = brand::ActiveModel {
      is_approved: Set(true),
      is_deleted: Set(true),
      ..hidden.into()
    }
    .update(&db)
    .await
    .unwrap();

    assert!(!access.can_view(&deleted, Some("a@shop.io")).await.unwrap());
    assert!(access.can_view(&deleted, Some("root@shop.io")).await.unwrap());
    assert!(access.can_view(&brand, None).await.unwrap());
  }
}
