//! The queryable set of transactions a rule currently matches.
//!
//! A [`TransactionScope`] wraps a sea-orm `Select` and remembers which joins
//! were registered, so `prepare` steps can be repeated without duplicating
//! joins or rows. Nothing is loaded until `count` or an executor runs.

use std::collections::BTreeSet;

use sea_orm::{
    ConnectionTrait, JoinType, PaginatorTrait, QueryFilter, QuerySelect, QueryTrait, Select,
    prelude::*,
    sea_query::{IntoCondition, SelectStatement},
};

use crate::{ResultEngine, transactions};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum ScopeJoin {
    Merchant,
}

#[derive(Clone, Debug)]
pub struct TransactionScope {
    select: Select<transactions::Entity>,
    joins: BTreeSet<ScopeJoin>,
}

impl TransactionScope {
    pub(crate) fn new(select: Select<transactions::Entity>) -> Self {
        Self {
            select,
            joins: BTreeSet::new(),
        }
    }

    /// Registers a join once; later calls for the same join are no-ops.
    pub(crate) fn join(mut self, join: ScopeJoin) -> Self {
        if self.joins.insert(join) {
            self.select = match join {
                ScopeJoin::Merchant => self
                    .select
                    .join(JoinType::LeftJoin, transactions::Relation::Merchant.def()),
            };
        }
        self
    }

    pub(crate) fn filter<F: IntoCondition>(mut self, condition: F) -> Self {
        self.select = self.select.filter(condition);
        self
    }

    /// The underlying query, for executors that narrow it further.
    pub(crate) fn select(&self) -> Select<transactions::Entity> {
        self.select.clone()
    }

    /// `SELECT transactions.id ...` of the scope, used as the predicate of
    /// bulk updates.
    pub(crate) fn id_subquery(&self) -> SelectStatement {
        self.select
            .clone()
            .select_only()
            .column(transactions::Column::Id)
            .into_query()
    }

    /// Number of matching rows, without loading them.
    pub async fn count<C: ConnectionTrait>(&self, db: &C) -> ResultEngine<u64> {
        Ok(self.select.clone().count(db).await?)
    }

    #[cfg(test)]
    pub(crate) fn to_sql(&self) -> String {
        self.select.build(sea_orm::DbBackend::Sqlite).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_join_is_registered_once() {
        let scope = TransactionScope::new(transactions::Entity::find())
            .join(ScopeJoin::Merchant)
            .join(ScopeJoin::Merchant);

        assert_eq!(scope.to_sql().matches("LEFT JOIN").count(), 1);
    }
}
