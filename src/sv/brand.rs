use serde::Deserialize;

use crate::{
  entity::{AccessRole, brand, brand_access, genre},
  prelude::*,
  sv::{
    Access,
    access::Role,
    activity::{Activity, Event},
    user::{User, normalize_email},
  },
};

pub struct Brand<'a> {
  db: &'a DatabaseConnection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Moderation {
  #[serde(default)]
  pub approved: Option<bool>,
  #[serde(default)]
  pub hidden: Option<bool>,
}

impl<'a> Brand<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Creates a brand awaiting approval, owned by `owner`.
  pub async fn create(
    &self,
    owner: &str,
    name: &str,
    genre_id: Option<i32>,
  ) -> Result<brand::Model> {
    let owner = normalize_email(owner)?;
    let name = name.trim();
    if name.is_empty() {
      return Err(Error::validation("brand name is required"));
    }
    if let Some(id) = genre_id {
      genre::Entity::find_by_id(id)
        .one(self.db)
        .await?
        .ok_or(Error::NotFound("genre"))?;
    }
    User::new(self.db).get_or_create(&owner).await?;

    let now = Utc::now().naive_utc();
    let txn = self.db.begin().await?;

    let brand = brand::ActiveModel {
      id: NotSet,
      name: Set(name.to_string()),
      genre_id: Set(genre_id),
      total_sales: Set(0),
      total_earnings: Set(0),
      total_carved: Set(0),
      total_paid: Set(0),
      is_approved: Set(false),
      is_hidden: Set(false),
      is_deleted: Set(false),
      created_at: Set(now),
    }
    .insert(&txn)
    .await?;

    brand_access::ActiveModel {
      brand_id: Set(brand.id),
      user_email: Set(owner.clone()),
      role: Set(AccessRole::Owner),
      created_at: Set(now),
    }
    .insert(&txn)
    .await?;

    Activity::new(&txn)
      .record(Event::BrandCreated {
        brand_id: brand.id,
        owner_email: owner.clone(),
      })
      .await?;

    txn.commit().await?;

    info!(brand_id = brand.id, "{owner} created brand `{}`", brand.name);
    Ok(brand)
  }

  /// Brand as seen by `viewer`. Brands the viewer may not see are reported
  /// as missing.
  pub async fn view(
    &self,
    brand_id: i32,
    viewer: Option<&str>,
  ) -> Result<brand::Model> {
    let brand = brand::Entity::find_by_id(brand_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("brand"))?;

    if Access::new(self.db).can_view(&brand, viewer).await? {
      Ok(brand)
    } else {
      Err(Error::NotFound("brand"))
    }
  }

  /// Approval is a platform decision; hiding is up to the brand's team.
  pub async fn moderate(
    &self,
    brand_id: i32,
    actor: &str,
    moderation: Moderation,
  ) -> Result<brand::Model> {
    let access = Access::new(self.db);
    let brand = access.live_brand(brand_id).await?;

    let required = match moderation.approved {
      Some(_) => Role::PlatformAdmin,
      None => Role::Manager,
    };
    access.require(brand_id, actor, required).await?;

    let mut model: brand::ActiveModel = brand.into();
    if let Some(approved) = moderation.approved {
      model.is_approved = Set(approved);
    }
    if let Some(hidden) = moderation.hidden {
      model.is_hidden = Set(hidden);
    }

    let brand = model.update(self.db).await?;
    info!(
      brand_id,
      "{actor} moderated brand: approved={}, hidden={}",
      brand.is_approved,
      brand.is_hidden
    );
    Ok(brand)
  }

  /// Soft delete. Orders and earnings stay on record.
  pub async fn delete(&self, brand_id: i32, actor: &str) -> Result<()> {
    let access = Access::new(self.db);
    let brand = access.live_brand(brand_id).await?;
    access.require(brand_id, actor, Role::Owner).await?;

    brand::ActiveModel { is_deleted: Set(true), ..brand.into() }
      .update(self.db)
      .await?;

    warn!(brand_id, "brand deleted by {actor}");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{entity::UserRole, sv::test_utils::test_db};

  #[tokio::test]
  async fn test_create_makes_single_owner() {
    let db = test_db::setup().await;
    let brand = Brand::new(&db)
      .create("Owner@shop.io", "  Night Owls ", None)
      .await
      .unwrap();

    assert_eq!(brand.name, "Night Owls");
    assert!(!brand.is_approved);
    assert_eq!(test_db::owners(&db, brand.id).await, vec!["owner@shop.io"]);

    let events = Activity::new(&db).by_brand(brand.id, 5).await.unwrap();
    assert_eq!(events[0].kind(), "brand_created");
  }

  #[tokio::test]
  async fn test_unapproved_brand_is_visible_to_team_only() {
    let db = test_db::setup().await;
    test_db::make_admin(&db, "root@shop.io", UserRole::PlatformAdmin).await;
    let sv = Brand::new(&db);
    let brand = sv.create("owner@shop.io", "Owls", None).await.unwrap();

    assert!(matches!(sv.view(brand.id, None).await, Err(Error::NotFound(_))));
    assert!(matches!(
      sv.view(brand.id, Some("x@shop.io")).await,
      Err(Error::NotFound(_))
    ));
    assert!(sv.view(brand.id, Some("owner@shop.io")).await.is_ok());

    let denied = sv
      .moderate(brand.id, "owner@shop.io", Moderation {
        approved: Some(true),
        hidden: None,
      })
      .await;
    assert!(matches!(denied, Err(Error::Forbidden(_))));

    sv.moderate(brand.id, "root@shop.io", Moderation {
      approved: Some(true),
      hidden: None,
    })
    .await
    .unwrap();
    assert!(sv.view(brand.id, None).await.is_ok());

    sv.moderate(brand.id, "owner@shop.io", Moderation {
      approved: None,
      hidden: Some(true),
    })
    .await
    .unwrap();
    assert!(sv.view(brand.id, Some("x@shop.io")).await.is_err());
  }

  #[tokio::test]
  async fn test_deleted_brand() {
    let db = test_db::setup().await;
    test_db::make_admin(&db, "root@shop.io", UserRole::PlatformAdmin).await;
    let brand = test_db::brand(&db, "owner@shop.io").await;
    let sv = Brand::new(&db);

    sv.delete(brand.id, "owner@shop.io").await.unwrap();

    assert!(sv.view(brand.id, Some("owner@shop.io")).await.is_err());
    assert!(sv.view(brand.id, Some("root@shop.io")).await.is_ok());
    assert!(matches!(
      sv.delete(brand.id, "owner@shop.io").await,
      Err(Error::NotFound("brand"))
    ));
  }
}
