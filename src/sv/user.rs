use sea_orm::sea_query::OnConflict;

use crate::{
  entity::{payment_method, user, user::UserRole},
  prelude::*,
};

/// Canonical form of an account email: trimmed and lowercased.
pub fn normalize_email(raw: &str) -> Result<String> {
  let email = raw.trim().to_lowercase();
  match email.split_once('@') {
    Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
      Ok(email)
    }
    _ => Err(Error::validation(format!("`{}` is not a valid email", raw.trim()))),
  }
}

pub struct User<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> User<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Accounts are created the first time an identity is seen.
  pub async fn get_or_create(&self, email: &str) -> Result<user::Model> {
    let email = normalize_email(email)?;
    if let Some(user) = self.by_email(&email).await? {
      return Ok(user);
    }

    let now = Utc::now().naive_utc();
    let user = user::ActiveModel {
      id: NotSet,
      email: Set(email.clone()),
      role: Set(UserRole::User),
      referred_by_email: Set(None),
      referral_paid: Set(0),
      created_at: Set(now),
    };

    match user.insert(self.db).await {
      Ok(user) => {
        debug!("Registered user {} ({})", user.id, user.email);
        Ok(user)
      }
      // lost a race with a concurrent first request for the same identity
      Err(err) if is_unique_violation(&err) => {
        self.by_email(&email).await?.ok_or(Error::NotFound("user"))
      }
      Err(err) => Err(err.into()),
    }
  }

  pub async fn by_id(&self, id: i32) -> Result<Option<user::Model>> {
    Ok(user::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn by_email(&self, email: &str) -> Result<Option<user::Model>> {
    let email = normalize_email(email)?;
    Ok(
      user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(self.db)
        .await?,
    )
  }

  /// Platform roles are granted by admins; only super admins may mint
  /// other super admins.
  pub async fn set_role(
    &self,
    actor_email: &str,
    target_email: &str,
    role: UserRole,
  ) -> Result<user::Model> {
    let actor = self
      .by_email(actor_email)
      .await?
      .ok_or(Error::NotFound("user"))?;

    let allowed = match role {
      UserRole::SuperAdmin => actor.role == UserRole::SuperAdmin,
      UserRole::PlatformAdmin | UserRole::User => actor.role.is_admin(),
    };
    if !allowed {
      return Err(Error::forbidden("insufficient platform role"));
    }

    let target = self.get_or_create(target_email).await?;
    if target.role == UserRole::SuperAdmin && actor.role != UserRole::SuperAdmin
    {
      return Err(Error::forbidden("cannot change a super admin"));
    }

    let updated = user::ActiveModel { role: Set(role), ..target.into() }
      .update(self.db)
      .await?;

    info!("{} set role of {} to {:?}", actor.email, updated.email, role);
    Ok(updated)
  }

  /// Registers (or replaces) the payout destination for one provider.
  pub async fn set_payment_method(
    &self,
    user_id: i32,
    provider: &str,
    destination: &str,
  ) -> Result<payment_method::Model> {
    let provider = provider.trim().to_lowercase();
    let destination = destination.trim().to_string();
    if provider.is_empty() || destination.is_empty() {
      return Err(Error::validation("provider and destination are required"));
    }

    self.by_id(user_id).await?.ok_or(Error::NotFound("user"))?;

    let model = payment_method::ActiveModel {
      user_id: Set(user_id),
      provider: Set(provider.clone()),
      destination: Set(destination),
      created_at: Set(Utc::now().naive_utc()),
    };

    payment_method::Entity::insert(model)
      .on_conflict(
        OnConflict::columns([
          payment_method::Column::UserId,
          payment_method::Column::Provider,
        ])
        .update_column(payment_method::Column::Destination)
        .to_owned(),
      )
      .exec_without_returning(self.db)
      .await?;

    payment_method::Entity::find_by_id((user_id, provider))
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("payment method"))
  }

  pub async fn payment_method(
    &self,
    user_id: i32,
    provider: &str,
  ) -> Result<Option<payment_method::Model>> {
    Ok(
      payment_method::Entity::find_by_id((user_id, provider.to_lowercase()))
        .one(self.db)
        .await?,
    )
  }
}

pub fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
  matches!(err.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_)))
}
