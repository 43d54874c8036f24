use sea_orm::{ConnectionTrait, PaginatorTrait, QueryFilter, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, Registry, ResourceType, ResultEngine, categories, families, merchants, rules,
    tags,
};

use super::Engine;

/// Generates `_exists_in_family` and `require_in_family` methods for a target
/// entity.
macro_rules! impl_target_in_family {
    ($exists_fn:ident, $require_fn:ident, $entity:path, $family_col:expr, $err_msg:literal) => {
        pub(crate) async fn $exists_fn<C: ConnectionTrait>(
            &self,
            db: &C,
            family_id: Uuid,
            target_id: Uuid,
        ) -> ResultEngine<bool> {
            <$entity>::find_by_id(target_id)
                .filter($family_col.eq(family_id))
                .count(db)
                .await
                .map(|found| found > 0)
                .map_err(Into::into)
        }

        pub(super) async fn $require_fn<C: ConnectionTrait>(
            &self,
            db: &C,
            family_id: Uuid,
            target_id: Uuid,
        ) -> ResultEngine<()> {
            if !self.$exists_fn(db, family_id, target_id).await? {
                return Err(EngineError::KeyNotFound($err_msg.to_string()));
            }
            Ok(())
        }
    };
}

impl Engine {
    impl_target_in_family!(
        category_exists_in_family,
        require_category_in_family,
        categories::Entity,
        categories::Column::FamilyId,
        "category not exists"
    );

    impl_target_in_family!(
        merchant_exists_in_family,
        require_merchant_in_family,
        merchants::Entity,
        merchants::Column::FamilyId,
        "merchant not exists"
    );

    impl_target_in_family!(
        tag_exists_in_family,
        require_tag_in_family,
        tags::Entity,
        tags::Column::FamilyId,
        "tag not exists"
    );

    pub(super) async fn require_family<C: ConnectionTrait>(
        &self,
        db: &C,
        family_id: Uuid,
    ) -> ResultEngine<families::Model> {
        families::Entity::find_by_id(family_id)
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("family not exists".to_string()))
    }

    /// Rules are only visible through their own family.
    pub(super) async fn require_rule_in_family<C: ConnectionTrait>(
        &self,
        db: &C,
        family_id: Uuid,
        rule_id: Uuid,
    ) -> ResultEngine<rules::Model> {
        rules::Entity::find_by_id(rule_id)
            .filter(rules::Column::FamilyId.eq(family_id))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("rule not exists".to_string()))
    }

    /// Registry for a family. AI is enabled only when the family opted in and
    /// a provider is configured.
    pub(super) fn registry_for(
        &self,
        family: &families::Model,
        resource_type: ResourceType,
        effective_date: Option<chrono::NaiveDate>,
    ) -> Registry {
        Registry::new(
            resource_type,
            family.id,
            effective_date,
            family.ai_enabled && self.provider.is_some(),
        )
    }
}
