//! SQL statement builder.

use georm_proto::{BoundingBox, LogicalOperator, Operand, Operator, Pagination, Value};
use tracing::trace;

use super::alias::AliasAllocator;
use super::dialect::Dialect;
use super::params::{ColumnType, ParameterList};
use super::read_plan::{PropertySlot, ReadPlan};
use super::table::{JoinGraph, TableDescriptor, TableId};
use super::where_clause::WhereClause;
use crate::catalog::BBoxColumns;
use crate::error::Error;

/// Role of a selected column, recorded in the read-plan.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectCategory {
    /// Scalar property value.
    Property(String),
    /// Spatial property: geometry text plus SRID.
    Spatial {
        property: String,
        srid_column: Option<String>,
    },
    /// Binary stream payload.
    Stream,
    /// Id of the matched or related object.
    RelatedId,
    /// Named extra column.
    Extra {
        name: String,
        column_type: ColumnType,
    },
}

/// Accumulates the pieces of one SELECT statement.
///
/// Joins are deduplicated by join-path equivalence: submitting a table that
/// is equivalent to one already present returns the existing table.
#[derive(Debug)]
pub struct SqlStatementBuilder {
    dialect: Dialect,
    aliases: AliasAllocator,
    graph: JoinGraph,
    root: TableId,
    joins: Vec<TableId>,
    select: Vec<String>,
    plan: ReadPlan,
    where_clause: WhereClause,
    order_by: Vec<String>,
    params: ParameterList,
    pagination: Option<Pagination>,
}

impl SqlStatementBuilder {
    /// Start a statement reading from `table`.
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        let mut aliases = AliasAllocator::new();
        let mut graph = JoinGraph::new();
        let root = graph.insert(TableDescriptor::new(table), aliases.next());
        Self {
            dialect,
            aliases,
            graph,
            root,
            joins: Vec::new(),
            select: Vec::new(),
            plan: ReadPlan::new(),
            where_clause: WhereClause::new(),
            order_by: Vec::new(),
            params: ParameterList::new(),
            pagination: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The FROM table.
    pub fn root(&self) -> TableId {
        self.root
    }

    pub fn alias(&self, table: TableId) -> Result<&str, Error> {
        self.graph.alias(table)
    }

    pub fn table_name(&self, table: TableId) -> Result<&str, Error> {
        Ok(&self.graph.get(table)?.name)
    }

    /// Left-join a table, reusing an equivalent table already present.
    pub fn add_left_join(&mut self, descriptor: TableDescriptor) -> Result<TableId, Error> {
        if descriptor.edge().is_none() {
            return Err(Error::Internal(format!(
                "table '{}' has no join edge",
                descriptor.name
            )));
        }
        if let Some(existing) = self.graph.find_equivalent(&descriptor)? {
            return Ok(existing);
        }
        let alias = self.aliases.next();
        trace!(table = %descriptor.name, alias = %alias, "adding join");
        let id = self.graph.insert(descriptor, alias);
        self.joins.push(id);
        Ok(id)
    }

    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    /// Select a column and record its read-plan slot.
    pub fn add_select(
        &mut self,
        table: TableId,
        column: &str,
        category: SelectCategory,
    ) -> Result<(), Error> {
        let alias = self.graph.alias(table)?.to_string();
        let ordinal = self.select.len();
        match category {
            SelectCategory::Property(name) => {
                self.plan.set_property(&name, PropertySlot::Scalar(ordinal))?;
                self.select.push(self.dialect.column(&alias, column));
            }
            SelectCategory::Spatial {
                property,
                srid_column,
            } => {
                self.plan.set_property(
                    &property,
                    PropertySlot::Spatial {
                        geometry: ordinal,
                        srid: ordinal + 1,
                    },
                )?;
                self.select.push(self.dialect.geometry_text(&alias, column));
                self.select.push(self.dialect.geometry_srid(
                    &alias,
                    column,
                    srid_column.as_deref(),
                ));
            }
            SelectCategory::Stream => {
                self.plan.set_stream(ordinal)?;
                self.select.push(self.dialect.column(&alias, column));
            }
            SelectCategory::RelatedId => {
                self.plan.set_related_id(ordinal)?;
                self.select.push(self.dialect.column(&alias, column));
            }
            SelectCategory::Extra { name, column_type } => {
                self.plan.set_extra(&name, ordinal, column_type)?;
                self.select.push(self.dialect.column(&alias, column));
            }
        }
        Ok(())
    }

    pub fn read_plan(&self) -> &ReadPlan {
        &self.plan
    }

    /// Add a comparison predicate to the current group.
    pub fn add_where(
        &mut self,
        table: TableId,
        column: &str,
        operator: Operator,
        operand: &Operand,
        column_type: ColumnType,
    ) -> Result<(), Error> {
        let sql_op = operator.as_sql().ok_or_else(|| {
            Error::InvalidRequest(format!("operator {:?} is not supported", operator))
        })?;
        let col = self.dialect.column(self.graph.alias(table)?, column);

        let predicate = if operator.is_unary() {
            format!("{} {}", col, sql_op)
        } else if operator.is_list() {
            let values: Vec<Value> = match operand {
                Operand::List(values) => values.clone(),
                Operand::Value(value) => vec![value.clone()],
                Operand::None => Vec::new(),
            };
            if values.is_empty() {
                return Err(Error::InvalidRequest(format!(
                    "{} on '{}' needs at least one value",
                    sql_op, column
                )));
            }
            let placeholders: Vec<String> = values
                .into_iter()
                .map(|v| self.params.push(v, column_type))
                .collect();
            format!("{} {} ({})", col, sql_op, placeholders.join(", "))
        } else {
            let value = match operand {
                Operand::Value(value) => value.clone(),
                Operand::None => Value::Null,
                Operand::List(_) => {
                    return Err(Error::InvalidRequest(format!(
                        "{} on '{}' takes a single value",
                        sql_op, column
                    )))
                }
            };
            match (operator, value.is_null()) {
                (Operator::Eq, true) => format!("{} IS NULL", col),
                (Operator::Ne, true) => format!("{} IS NOT NULL", col),
                (_, true) => {
                    return Err(Error::InvalidRequest(format!(
                        "{} on '{}' cannot compare with null",
                        sql_op, column
                    )))
                }
                (_, false) => {
                    let param = self.params.push(value, column_type);
                    format!("{} {} {}", col, sql_op, param)
                }
            }
        };

        self.where_clause.push(predicate);
        Ok(())
    }

    /// Set the connector for the next predicate.
    pub fn add_operator(&mut self, op: LogicalOperator) {
        self.where_clause.operator(op);
    }

    pub fn start_inner_group(&mut self) {
        self.where_clause.start_group();
    }

    pub fn end_inner_group(&mut self) -> Result<(), Error> {
        self.where_clause.end_group()
    }

    /// Add a backend-native intersects predicate against a WKT polygon.
    pub fn add_spatial_intersects(
        &mut self,
        table: TableId,
        column: &str,
        wkt: String,
        srid: i32,
    ) -> Result<(), Error> {
        if !self.dialect.supports_native_spatial() {
            return Err(Error::Internal(format!(
                "dialect {} has no native spatial predicate",
                self.dialect.as_str()
            )));
        }
        let alias = self.graph.alias(table)?.to_string();
        let wkt_param = self.params.push(Value::String(wkt), ColumnType::String);
        let srid_param = self.params.push(Value::Int32(srid), ColumnType::Int32);
        if let Some(predicate) = self
            .dialect
            .intersects(&alias, column, &wkt_param, &srid_param)
        {
            self.where_clause.push(predicate);
        }
        Ok(())
    }

    /// Add a bounding-box overlap predicate over companion columns.
    pub fn add_bbox_overlap(
        &mut self,
        table: TableId,
        columns: &BBoxColumns,
        bbox: &BoundingBox,
    ) -> Result<(), Error> {
        let alias = self.graph.alias(table)?.to_string();
        let max_x = self.params.push(Value::Double(bbox.max_x), ColumnType::Double);
        let min_x = self.params.push(Value::Double(bbox.min_x), ColumnType::Double);
        let max_y = self.params.push(Value::Double(bbox.max_y), ColumnType::Double);
        let min_y = self.params.push(Value::Double(bbox.min_y), ColumnType::Double);
        let d = self.dialect;
        self.where_clause.push(format!(
            "({} <= {} AND {} >= {} AND {} <= {} AND {} >= {})",
            d.column(&alias, &columns.min_x),
            max_x,
            d.column(&alias, &columns.max_x),
            min_x,
            d.column(&alias, &columns.min_y),
            max_y,
            d.column(&alias, &columns.max_y),
            min_y,
        ));
        Ok(())
    }

    pub fn add_order_by(&mut self, table: TableId, column: &str, ascending: bool) -> Result<(), Error> {
        let col = self.dialect.column(self.graph.alias(table)?, column);
        self.order_by
            .push(format!("{} {}", col, if ascending { "ASC" } else { "DESC" }));
        Ok(())
    }

    pub fn has_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn set_pagination(&mut self, pagination: Option<Pagination>) {
        self.pagination = pagination;
    }

    pub fn parameters(&self) -> &ParameterList {
        &self.params
    }

    fn render_from(&self) -> Result<String, Error> {
        let root = self.graph.get(self.root)?;
        let mut sql = format!(
            "FROM {} {}",
            self.dialect.quote(&root.name),
            self.graph.alias(self.root)?
        );
        for &id in &self.joins {
            let table = self.graph.get(id)?;
            let edge = table
                .edge()
                .ok_or_else(|| Error::Internal(format!("join '{}' lost its edge", table.name)))?;
            let alias = self.graph.alias(id)?;
            let parent_alias = self.graph.alias(edge.parent)?;
            sql.push_str(&format!(
                " LEFT JOIN {} {} ON {} = {}",
                self.dialect.quote(&table.name),
                alias,
                self.dialect.column(alias, &edge.own_key),
                self.dialect.column(parent_alias, &edge.parent_key)
            ));
        }
        if let Some(predicate) = self.where_clause.render()? {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        Ok(sql)
    }

    /// Render the SELECT statement and hand out the read-plan.
    pub fn build(&self) -> Result<(String, ReadPlan), Error> {
        if self.select.is_empty() {
            return Err(Error::Internal("statement selects no columns".to_string()));
        }
        let mut sql = format!("SELECT {} {}", self.select.join(", "), self.render_from()?);
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(page) = self.pagination {
            sql.push(' ');
            sql.push_str(&self.dialect.paging(page.limit, page.offset));
        }
        Ok((sql, self.plan.clone()))
    }

    /// Render the companion count statement: same joins and predicate, no
    /// ordering and no paging.
    pub fn build_count(&self) -> Result<String, Error> {
        Ok(format!("SELECT COUNT(*) {}", self.render_from()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_select() {
        let mut builder = SqlStatementBuilder::new(Dialect::Sqlite, "items");
        let root = builder.root();
        builder
            .add_select(root, "id", SelectCategory::Property("Id".into()))
            .unwrap();
        builder
            .add_where(
                root,
                "name",
                Operator::Like,
                &Operand::Value(Value::from("a%")),
                ColumnType::String,
            )
            .unwrap();
        builder.add_order_by(root, "name", false).unwrap();

        let (sql, plan) = builder.build().unwrap();
        assert_eq!(
            sql,
            "SELECT t0.\"id\" FROM \"items\" t0 WHERE t0.\"name\" LIKE @p0 ORDER BY t0.\"name\" DESC"
        );
        assert_eq!(plan.property("Id"), Some(PropertySlot::Scalar(0)));
        assert_eq!(builder.parameters().len(), 1);
    }

    #[test]
    fn test_join_dedup() {
        let mut builder = SqlStatementBuilder::new(Dialect::SqlServer, "images");
        let root = builder.root();
        let first = builder
            .add_left_join(TableDescriptor::joined("items", root, "item_id", "id"))
            .unwrap();
        let second = builder
            .add_left_join(TableDescriptor::joined("items", root, "item_id", "id"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(builder.join_count(), 1);
        assert_eq!(builder.alias(first).unwrap(), "t1");

        assert!(builder.add_left_join(TableDescriptor::new("orphan")).is_err());
    }

    #[test]
    fn test_null_and_list_operands() {
        let mut builder = SqlStatementBuilder::new(Dialect::Sqlite, "items");
        let root = builder.root();
        builder
            .add_select(root, "id", SelectCategory::Property("Id".into()))
            .unwrap();
        builder
            .add_where(root, "a", Operator::Eq, &Operand::Value(Value::Null), ColumnType::String)
            .unwrap();
        builder.add_operator(LogicalOperator::And);
        builder
            .add_where(
                root,
                "b",
                Operator::NotIn,
                &Operand::List(vec![Value::Int32(1), Value::Int32(2)]),
                ColumnType::Int32,
            )
            .unwrap();

        let (sql, _) = builder.build().unwrap();
        assert_eq!(
            sql,
            "SELECT t0.\"id\" FROM \"items\" t0 WHERE t0.\"a\" IS NULL AND t0.\"b\" NOT IN (@p0, @p1)"
        );

        let err = builder
            .add_where(root, "b", Operator::In, &Operand::List(vec![]), ColumnType::Int32)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let err = builder
            .add_where(root, "b", Operator::Gt, &Operand::Value(Value::Null), ColumnType::Int32)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_unsupported_operator() {
        let mut builder = SqlStatementBuilder::new(Dialect::Sqlite, "items");
        let root = builder.root();
        let err = builder
            .add_where(
                root,
                "name",
                Operator::Matches,
                &Operand::Value(Value::from("x")),
                ColumnType::String,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_count_and_paging() {
        let mut builder = SqlStatementBuilder::new(Dialect::SqlServer, "items");
        let root = builder.root();
        builder
            .add_select(root, "id", SelectCategory::Property("Id".into()))
            .unwrap();
        builder
            .add_where(root, "n", Operator::Ge, &Operand::Value(Value::Int32(3)), ColumnType::Int32)
            .unwrap();
        builder.add_order_by(root, "id", true).unwrap();
        builder.set_pagination(Some(Pagination::new(10, 30)));

        let (sql, _) = builder.build().unwrap();
        assert_eq!(
            sql,
            "SELECT t0.[id] FROM [items] t0 WHERE t0.[n] >= @p0 ORDER BY t0.[id] ASC OFFSET 30 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            builder.build_count().unwrap(),
            "SELECT COUNT(*) FROM [items] t0 WHERE t0.[n] >= @p0"
        );
    }

    #[test]
    fn test_spatial_select_and_predicates() {
        let mut builder = SqlStatementBuilder::new(Dialect::SqlServer, "images");
        let root = builder.root();
        builder
            .add_select(
                root,
                "Footprint",
                SelectCategory::Spatial {
                    property: "Footprint".into(),
                    srid_column: None,
                },
            )
            .unwrap();
        builder
            .add_spatial_intersects(root, "Footprint", "POLYGON((0 0,1 0,1 1,0 0))".into(), 4326)
            .unwrap();

        let (sql, plan) = builder.build().unwrap();
        assert_eq!(
            sql,
            "SELECT t0.[Footprint].STAsText(), t0.[Footprint].STSrid FROM [images] t0 \
             WHERE t0.[Footprint].STIntersects(geometry::STGeomFromText(@p0, @p1)) = 1"
        );
        assert_eq!(
            plan.property("Footprint"),
            Some(PropertySlot::Spatial {
                geometry: 0,
                srid: 1
            })
        );

        let mut lite = SqlStatementBuilder::new(Dialect::Sqlite, "images");
        let root = lite.root();
        assert!(lite
            .add_spatial_intersects(root, "Footprint", "POLYGON EMPTY".into(), 4326)
            .is_err());
        let bbox = BoundingBox {
            min_x: 0.0,
            min_y: 1.0,
            max_x: 2.0,
            max_y: 3.0,
        };
        lite.add_bbox_overlap(root, &BBoxColumns::prefixed("F"), &bbox)
            .unwrap();
        assert_eq!(
            lite.build_count().unwrap(),
            "SELECT COUNT(*) FROM \"images\" t0 WHERE (t0.\"FMinX\" <= @p0 AND t0.\"FMaxX\" >= @p1 \
             AND t0.\"FMinY\" <= @p2 AND t0.\"FMaxY\" >= @p3)"
        );
    }
}
