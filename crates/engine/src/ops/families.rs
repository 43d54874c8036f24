use sea_orm::{ActiveValue, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{Family, ResultEngine, families, util::normalize_display};

use super::{Engine, with_tx};

impl Engine {
    pub async fn create_family(&self, name: &str, ai_enabled: bool) -> ResultEngine<Family> {
        let name = normalize_display(name, "family")?;
        let model = families::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            name: ActiveValue::Set(name),
            ai_enabled: ActiveValue::Set(ai_enabled),
        }
        .insert(&self.database)
        .await?;
        tracing::info!(family_id = %model.id, ai_enabled, "family created");
        Ok(model.into())
    }

    pub async fn family(&self, family_id: Uuid) -> ResultEngine<Family> {
        Ok(self.require_family(&self.database, family_id).await?.into())
    }

    pub async fn list_families(&self) -> ResultEngine<Vec<Family>> {
        let models = families::Entity::find()
            .order_by_asc(families::Column::Name)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(Family::from).collect())
    }

    /// Toggle AI enrichment for a family. Already stored AI actions stay in
    /// their rules and fail closed while disabled.
    pub async fn set_family_ai(&self, family_id: Uuid, enabled: bool) -> ResultEngine<Family> {
        with_tx!(self, |db_tx| {
            let model = self.require_family(&db_tx, family_id).await?;
            let mut active: families::ActiveModel = model.into();
            active.ai_enabled = ActiveValue::Set(enabled);
            let model = active.update(&db_tx).await?;
            Ok(Family::from(model))
        })
    }
}
