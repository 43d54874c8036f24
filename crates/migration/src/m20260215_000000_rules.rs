//! Rule tables.
//!
//! - `rules`: condition-set + action-set owned by a family
//! - `rule_conditions` / `rule_actions`: ordered children of a rule
//! - `rule_runs`: one row per rule execution with its per-action summary

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Families {
    Table,
    Id,
}

#[derive(Iden)]
enum Rules {
    Table,
    Id,
    FamilyId,
    Name,
    ResourceType,
    EffectiveDate,
    Active,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum RuleConditions {
    Table,
    Id,
    RuleId,
    Position,
    ConditionType,
    Operator,
    Value,
}

#[derive(Iden)]
enum RuleActions {
    Table,
    Id,
    RuleId,
    Position,
    ActionType,
    Value,
}

#[derive(Iden)]
enum RuleRuns {
    Table,
    Id,
    RuleId,
    ExecutionType,
    Status,
    RowsMatched,
    RowsUpdated,
    RowsSkipped,
    FailedActions,
    Summary,
    StartedAt,
    FinishedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Rules::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Rules::Id).blob().not_null().primary_key())
                    .col(ColumnDef::new(Rules::FamilyId).blob().not_null())
                    .col(ColumnDef::new(Rules::Name).string())
                    .col(
                        ColumnDef::new(Rules::ResourceType)
                            .string()
                            .not_null()
                            .default("transaction"),
                    )
                    .col(ColumnDef::new(Rules::EffectiveDate).date())
                    .col(
                        ColumnDef::new(Rules::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Rules::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Rules::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-rules-family_id")
                            .from(Rules::Table, Rules::FamilyId)
                            .to(Families::Table, Families::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RuleConditions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RuleConditions::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RuleConditions::RuleId).blob().not_null())
                    .col(
                        ColumnDef::new(RuleConditions::Position)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RuleConditions::ConditionType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RuleConditions::Operator)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RuleConditions::Value).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-rule_conditions-rule_id")
                            .from(RuleConditions::Table, RuleConditions::RuleId)
                            .to(Rules::Table, Rules::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RuleActions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RuleActions::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RuleActions::RuleId).blob().not_null())
                    .col(ColumnDef::new(RuleActions::Position).integer().not_null())
                    .col(ColumnDef::new(RuleActions::ActionType).string().not_null())
                    .col(ColumnDef::new(RuleActions::Value).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-rule_actions-rule_id")
                            .from(RuleActions::Table, RuleActions::RuleId)
                            .to(Rules::Table, Rules::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RuleRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RuleRuns::Id).blob().not_null().primary_key())
                    .col(ColumnDef::new(RuleRuns::RuleId).blob().not_null())
                    .col(ColumnDef::new(RuleRuns::ExecutionType).string().not_null())
                    .col(ColumnDef::new(RuleRuns::Status).string().not_null())
                    .col(
                        ColumnDef::new(RuleRuns::RowsMatched)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RuleRuns::RowsUpdated)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RuleRuns::RowsSkipped)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RuleRuns::FailedActions)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RuleRuns::Summary).text().not_null())
                    .col(ColumnDef::new(RuleRuns::StartedAt).timestamp().not_null())
                    .col(ColumnDef::new(RuleRuns::FinishedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-rule_runs-rule_id")
                            .from(RuleRuns::Table, RuleRuns::RuleId)
                            .to(Rules::Table, Rules::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-rule_runs-rule_id-started_at")
                    .table(RuleRuns::Table)
                    .col(RuleRuns::RuleId)
                    .col(RuleRuns::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RuleRuns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RuleActions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RuleConditions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Rules::Table).to_owned())
            .await?;
        Ok(())
    }
}
