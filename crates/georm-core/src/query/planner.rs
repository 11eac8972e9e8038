//! Class hierarchy join planning.
//!
//! Each class in a hierarchy may live in its own table linked to its base
//! class table by key columns. Reaching a property declared on an ancestor or
//! a derived class means walking the chain one level at a time and joining
//! every table transition once; the statement builder deduplicates repeated
//! walks from the same starting table.

use crate::catalog::{BindingSource, Catalog, ColumnBinding};
use crate::error::Error;
use crate::sql::{SqlStatementBuilder, TableDescriptor, TableId};

/// Walks the single-inheritance chain and submits the joins it needs.
pub struct JoinPlanner<'a> {
    catalog: &'a Catalog,
    source: BindingSource,
}

impl<'a> JoinPlanner<'a> {
    pub fn new(catalog: &'a Catalog, source: BindingSource) -> Self {
        Self { catalog, source }
    }

    /// Join from `queried` (read through `current`) up to the table of
    /// `target_base`.
    pub fn join_to_base(
        &self,
        builder: &mut SqlStatementBuilder,
        queried: &str,
        current: TableId,
        target_base: &str,
    ) -> Result<TableId, Error> {
        let mut class = queried.to_string();
        let mut table = current;
        while class != target_base {
            let base = self.catalog.base_class(&class)?.ok_or_else(|| {
                Error::Schema(format!(
                    "class '{}' does not derive from '{}'",
                    queried, target_base
                ))
            })?;
            let own = self.catalog.table_binding(&class, self.source)?;
            let base_table = self.catalog.table_binding(&base.name, self.source)?;
            if own.name != base_table.name {
                let descriptor = TableDescriptor::joined(
                    base_table.name.clone(),
                    table,
                    own.key_column.clone(),
                    base_table.key_column.clone(),
                );
                table = builder.add_left_join(descriptor)?;
            }
            class = base.name.clone();
        }
        Ok(table)
    }

    /// Join from `queried` (read through `current`) down to the table of
    /// `target_derived`.
    pub fn join_to_derived(
        &self,
        builder: &mut SqlStatementBuilder,
        queried: &str,
        current: TableId,
        target_derived: &str,
    ) -> Result<TableId, Error> {
        let mut class = queried.to_string();
        let mut table = current;
        while class != target_derived {
            let mut next = None;
            for child in self.catalog.derived_classes(&class) {
                if self.catalog.is_a(target_derived, child)? {
                    if next.is_some() {
                        return Err(Error::Schema(format!(
                            "more than one class derived from '{}' leads to '{}'",
                            class, target_derived
                        )));
                    }
                    next = Some(child.clone());
                }
            }
            let child = next.ok_or_else(|| {
                Error::Schema(format!(
                    "class '{}' is not derived from '{}'",
                    target_derived, queried
                ))
            })?;

            let own = self.catalog.table_binding(&class, self.source)?;
            let child_table = self.catalog.table_binding(&child, self.source)?;
            if own.name != child_table.name {
                let descriptor = TableDescriptor::joined(
                    child_table.name.clone(),
                    table,
                    own.key_column.clone(),
                    child_table.key_column.clone(),
                );
                table = builder.add_left_join(descriptor)?;
            }
            class = child;
        }
        Ok(table)
    }

    /// Table holding columns declared on `owner`, reached from `queried`.
    pub fn table_for(
        &self,
        builder: &mut SqlStatementBuilder,
        queried: &str,
        current: TableId,
        owner: &str,
    ) -> Result<TableId, Error> {
        if queried == owner {
            Ok(current)
        } else if self.catalog.is_a(queried, owner)? {
            self.join_to_base(builder, queried, current, owner)
        } else if self.catalog.is_a(owner, queried)? {
            self.join_to_derived(builder, queried, current, owner)
        } else {
            Err(Error::Schema(format!(
                "classes '{}' and '{}' are not in one hierarchy",
                queried, owner
            )))
        }
    }

    /// Table holding a bound column: the owner table, or the secondary table
    /// the binding declares.
    pub fn value_table(
        &self,
        builder: &mut SqlStatementBuilder,
        owner_table: TableId,
        binding: &ColumnBinding,
    ) -> Result<TableId, Error> {
        let Some(join) = &binding.join else {
            return Ok(owner_table);
        };
        let (key, parent_key) = join.keys().ok_or_else(|| {
            Error::Schema(format!(
                "join table '{}' of column '{}' is missing a key",
                join.table, binding.column
            ))
        })?;
        builder.add_left_join(TableDescriptor::joined(
            join.table.clone(),
            owner_table,
            parent_key,
            key,
        ))
    }
}
