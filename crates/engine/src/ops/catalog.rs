//! Categories, merchants and tags of a family.
//!
//! Names are unique per family by normalized key, so "Café" and "cafe" are
//! the same record.

use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Category, EngineError, EnrichmentSource, Merchant, ResultEngine, Tag, categories, merchants,
    tags,
    util::{normalize_display, require_key},
};

use super::{Engine, with_tx};

impl Engine {
    pub async fn create_category(&self, family_id: Uuid, name: &str) -> ResultEngine<Category> {
        let display = normalize_display(name, "category")?;
        let key = require_key(&display, "category")?;
        with_tx!(self, |db_tx| {
            self.require_family(&db_tx, family_id).await?;
            let existing = categories::Entity::find()
                .filter(categories::Column::FamilyId.eq(family_id))
                .filter(categories::Column::NameNorm.eq(key.clone()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::ExistingKey(display));
            }
            let model = categories::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4()),
                family_id: ActiveValue::Set(family_id),
                name: ActiveValue::Set(display),
                name_norm: ActiveValue::Set(key),
            }
            .insert(&db_tx)
            .await?;
            Ok(Category::from(model))
        })
    }

    pub async fn list_categories(&self, family_id: Uuid) -> ResultEngine<Vec<Category>> {
        self.require_family(&self.database, family_id).await?;
        let models = categories::Entity::find()
            .filter(categories::Column::FamilyId.eq(family_id))
            .order_by_asc(categories::Column::Name)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(Category::from).collect())
    }

    /// Create a user merchant.
    pub async fn create_merchant(&self, family_id: Uuid, name: &str) -> ResultEngine<Merchant> {
        let display = normalize_display(name, "merchant")?;
        let key = require_key(&display, "merchant")?;
        with_tx!(self, |db_tx| {
            self.require_family(&db_tx, family_id).await?;
            let existing = merchants::Entity::find()
                .filter(merchants::Column::FamilyId.eq(family_id))
                .filter(merchants::Column::NameNorm.eq(key.clone()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::ExistingKey(display));
            }
            let model = merchants::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4()),
                family_id: ActiveValue::Set(family_id),
                name: ActiveValue::Set(display),
                name_norm: ActiveValue::Set(key),
                source: ActiveValue::Set(EnrichmentSource::User.as_str().to_string()),
            }
            .insert(&db_tx)
            .await?;
            Merchant::try_from(model)
        })
    }

    pub async fn list_merchants(&self, family_id: Uuid) -> ResultEngine<Vec<Merchant>> {
        self.require_family(&self.database, family_id).await?;
        merchants::Entity::find()
            .filter(merchants::Column::FamilyId.eq(family_id))
            .order_by_asc(merchants::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Merchant::try_from)
            .collect()
    }

    pub async fn create_tag(&self, family_id: Uuid, name: &str) -> ResultEngine<Tag> {
        let display = normalize_display(name, "tag")?;
        let key = require_key(&display, "tag")?;
        with_tx!(self, |db_tx| {
            self.require_family(&db_tx, family_id).await?;
            let existing = tags::Entity::find()
                .filter(tags::Column::FamilyId.eq(family_id))
                .filter(tags::Column::NameNorm.eq(key.clone()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::ExistingKey(display));
            }
            let model = tags::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4()),
                family_id: ActiveValue::Set(family_id),
                name: ActiveValue::Set(display),
                name_norm: ActiveValue::Set(key),
            }
            .insert(&db_tx)
            .await?;
            Ok(Tag::from(model))
        })
    }

    pub async fn list_tags(&self, family_id: Uuid) -> ResultEngine<Vec<Tag>> {
        self.require_family(&self.database, family_id).await?;
        let models = tags::Entity::find()
            .filter(tags::Column::FamilyId.eq(family_id))
            .order_by_asc(tags::Column::Name)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(Tag::from).collect())
    }
}
