//! Object query compiler.
//!
//! Lowers a [`QueryRequest`] against the catalog into one parameterized
//! SELECT statement, an optional COUNT statement and the read-plan the
//! materializer needs to turn result rows back into records.

use georm_proto::{
    Criterion, IdSetCriterion, LogicalOperator, Operand, Operator, PropertyCriterion,
    QueryRequest, RelatedCriterion, RelationshipDirection, Value, ValueKind, WhereCriteria,
};
use tracing::debug;

use super::planner::JoinPlanner;
use crate::backend::Command;
use crate::catalog::{BindingSource, Catalog, ColumnBinding, OwnedProperty, RelationshipMapping};
use crate::config::CompilerConfig;
use crate::error::Error;
use crate::spatial::{bounding_box, polygon_to_wkt, validate_polygon, SpatialFilter};
use crate::sql::{
    ColumnType, Parameter, ReadPlan, SelectCategory, SqlStatementBuilder, TableDescriptor,
    TableId,
};

/// A property present in the result set.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedProperty {
    pub name: String,
    pub kind: ValueKind,
}

/// A non-property column selected from the root table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraSelect {
    /// Key in the record's extended data.
    pub name: String,
    pub column: String,
    pub column_type: ColumnType,
}

impl ExtraSelect {
    pub fn new(name: impl Into<String>, column: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            column_type,
        }
    }

    /// Extra whose key equals its column name.
    pub fn column(column: impl Into<String>, column_type: ColumnType) -> Self {
        let column = column.into();
        Self::new(column.clone(), column, column_type)
    }
}

/// Per-compilation options.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Primary tables or cache mirror tables.
    pub source: BindingSource,
    /// Extra columns selected from the root table.
    pub extras: Vec<ExtraSelect>,
}

impl CompileOptions {
    /// Options compiling against the cache mirror tables.
    pub fn cache() -> Self {
        Self {
            source: BindingSource::Cache,
            extras: Vec::new(),
        }
    }

    pub fn with_extra(mut self, extra: ExtraSelect) -> Self {
        self.extras.push(extra);
        self
    }
}

/// Output of the compiler.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Queried class.
    pub class: String,
    pub sql: String,
    /// COUNT statement, present when the request asked for a count.
    pub count_sql: Option<String>,
    pub read_plan: ReadPlan,
    /// Parameters shared by `sql` and `count_sql`.
    pub parameters: Vec<Parameter>,
    /// Properties with a result column, in selection order.
    pub properties: Vec<SelectedProperty>,
    /// Instance-id property of the queried class.
    pub id_property: String,
    /// Exact polygon test to run after materialization.
    pub spatial_filter: Option<SpatialFilter>,
}

impl CompiledQuery {
    pub fn command(&self) -> Command {
        Command::new(self.sql.clone()).with_parameters(self.parameters.clone())
    }

    pub fn count_command(&self) -> Option<Command> {
        self.count_sql
            .as_ref()
            .map(|sql| Command::new(sql.clone()).with_parameters(self.parameters.clone()))
    }
}

/// Compiles query requests against a catalog.
pub struct QueryCompiler<'a> {
    catalog: &'a Catalog,
    config: CompilerConfig,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(catalog: &'a Catalog, config: CompilerConfig) -> Self {
        Self { catalog, config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile against the primary tables.
    pub fn compile(&self, request: &QueryRequest) -> Result<CompiledQuery, Error> {
        self.compile_with(request, &CompileOptions::default())
    }

    /// Compile with explicit binding source and extra columns.
    pub fn compile_with(
        &self,
        request: &QueryRequest,
        options: &CompileOptions,
    ) -> Result<CompiledQuery, Error> {
        let class = self.catalog.class(&request.class)?;
        if !class.queryable {
            return Err(Error::InvalidRequest(format!(
                "class '{}' is not queryable",
                class.name
            )));
        }
        let table = self.catalog.table_binding(&class.name, options.source)?;

        let mut compilation = Compilation {
            catalog: self.catalog,
            planner: JoinPlanner::new(self.catalog, options.source),
            source: options.source,
            builder: SqlStatementBuilder::new(self.config.dialect, table.name.clone()),
            related_id_selected: false,
        };
        let root = compilation.builder.root();

        let id = self.catalog.id_property(&class.name)?;
        if id.property.binding(options.source).is_none() {
            return Err(Error::Schema(format!(
                "instance-id property '{}' of class '{}' has no column",
                id.name(),
                class.name
            )));
        }

        // Select list: requested properties (or all visible ones) plus the id
        let mut names: Vec<String> = match &request.select {
            Some(select) => select.clone(),
            None => self
                .catalog
                .properties(&class.name)?
                .iter()
                .map(|p| p.name().to_string())
                .collect(),
        };
        if !names.iter().any(|n| n == id.name()) {
            names.push(id.name().to_string());
        }

        let mut properties = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for name in names {
            if !seen.insert(name.clone()) {
                continue;
            }
            let owned = compilation.resolve(&class.name, &name)?;
            if compilation.select_property(&class.name, root, owned)? {
                properties.push(SelectedProperty {
                    name,
                    kind: owned.property.kind,
                });
            } else {
                debug!(class = %class.name, property = %name, "skipping unbacked property");
            }
        }

        if request.include_stream {
            match self.catalog.stream_column(&class.name, options.source)? {
                Some((owner, column)) => {
                    let table =
                        compilation
                            .planner
                            .table_for(&mut compilation.builder, &class.name, root, &owner.name)?;
                    compilation
                        .builder
                        .add_select(table, column, SelectCategory::Stream)?;
                }
                None => debug!(class = %class.name, "class has no stream column"),
            }
        }

        for extra in &options.extras {
            compilation.builder.add_select(
                root,
                &extra.column,
                SelectCategory::Extra {
                    name: extra.name.clone(),
                    column_type: extra.column_type,
                },
            )?;
        }

        for order in &request.order_by {
            let owned = compilation.resolve(&class.name, &order.property)?;
            if owned.property.is_spatial() {
                return Err(Error::InvalidRequest(format!(
                    "cannot order by spatial property '{}'",
                    order.property
                )));
            }
            if let Some((table, binding)) = compilation.property_column(&class.name, root, owned)? {
                compilation.builder.add_order_by(
                    table,
                    &binding.column,
                    order.direction.is_ascending(),
                )?;
            }
        }

        // Criteria are grouped so the polygon predicate ANDs with all of them
        let grouped = request.polygon.is_some();
        if grouped {
            compilation.builder.start_inner_group();
        }
        compilation.emit_criteria(&class.name, root, &request.criteria)?;
        if grouped {
            compilation.builder.end_inner_group()?;
        }

        let mut spatial_filter = None;
        if let Some(polygon) = &request.polygon {
            validate_polygon(polygon)?;
            let spatial = self.catalog.spatial_property(&class.name)?.ok_or_else(|| {
                Error::InvalidRequest(format!("class '{}' has no spatial property", class.name))
            })?;
            let (table, binding) = compilation
                .property_column(&class.name, root, spatial)?
                .ok_or_else(|| {
                    Error::InvalidRequest(format!(
                        "spatial property '{}' of class '{}' has no column",
                        spatial.name(),
                        class.name
                    ))
                })?;

            compilation.builder.add_operator(LogicalOperator::And);
            if self.config.dialect.supports_native_spatial() {
                compilation.builder.add_spatial_intersects(
                    table,
                    &binding.column,
                    polygon_to_wkt(polygon),
                    polygon.srid()?,
                )?;
            } else {
                if let Some(bbox) = binding.spatial.as_ref().and_then(|s| s.bbox.as_ref()) {
                    compilation
                        .builder
                        .add_bbox_overlap(table, bbox, &bounding_box(polygon)?)?;
                }
                let strip = !compilation.builder.read_plan().has_property(spatial.name());
                if strip {
                    compilation.select_property(&class.name, root, spatial)?;
                    properties.push(SelectedProperty {
                        name: spatial.name().to_string(),
                        kind: spatial.property.kind,
                    });
                }
                spatial_filter = Some(SpatialFilter {
                    property: spatial.name().to_string(),
                    polygon: polygon.clone(),
                    strip_property: strip,
                });
            }
        }

        if request.pagination.is_some() && !compilation.builder.has_order_by() {
            if let Some((table, binding)) = compilation.property_column(&class.name, root, id)? {
                compilation.builder.add_order_by(table, &binding.column, true)?;
            }
        }
        compilation.builder.set_pagination(request.pagination);

        let (sql, read_plan) = compilation.builder.build()?;
        let count_sql = if request.include_count {
            Some(compilation.builder.build_count()?)
        } else {
            None
        };
        let parameters = compilation.builder.parameters().as_slice().to_vec();

        debug!(
            class = %class.name,
            sql = %sql,
            params = parameters.len(),
            joins = compilation.builder.join_count(),
            "compiled query"
        );

        Ok(CompiledQuery {
            class: class.name.clone(),
            sql,
            count_sql,
            read_plan,
            parameters,
            properties,
            id_property: id.name().to_string(),
            spatial_filter,
        })
    }
}

/// State of one compilation.
struct Compilation<'a> {
    catalog: &'a Catalog,
    planner: JoinPlanner<'a>,
    source: BindingSource,
    builder: SqlStatementBuilder,
    related_id_selected: bool,
}

impl<'a> Compilation<'a> {
    fn resolve(&self, class: &str, property: &str) -> Result<OwnedProperty<'a>, Error> {
        self.catalog.find_property(class, property)?.ok_or_else(|| {
            Error::InvalidRequest(format!("class '{}' has no property '{}'", class, property))
        })
    }

    /// Table and binding of a property reached from `current`, `None` when
    /// the property is not backed for this source.
    fn property_column(
        &mut self,
        queried: &str,
        current: TableId,
        owned: OwnedProperty<'a>,
    ) -> Result<Option<(TableId, &'a ColumnBinding)>, Error> {
        let Some(binding) = owned.property.binding(self.source) else {
            return Ok(None);
        };
        let owner_table =
            self.planner
                .table_for(&mut self.builder, queried, current, &owned.owner.name)?;
        let table = self.planner.value_table(&mut self.builder, owner_table, binding)?;
        Ok(Some((table, binding)))
    }

    /// Select a property; returns false when it is not backed.
    fn select_property(
        &mut self,
        queried: &str,
        current: TableId,
        owned: OwnedProperty<'a>,
    ) -> Result<bool, Error> {
        let Some((table, binding)) = self.property_column(queried, current, owned)? else {
            return Ok(false);
        };
        let category = if owned.property.is_spatial() {
            SelectCategory::Spatial {
                property: owned.name().to_string(),
                srid_column: binding.spatial.as_ref().and_then(|s| s.srid_column.clone()),
            }
        } else {
            SelectCategory::Property(owned.name().to_string())
        };
        self.builder.add_select(table, &binding.column, category)?;
        Ok(true)
    }

    fn select_related_id(&mut self, table: TableId, column: &str) -> Result<(), Error> {
        if self.related_id_selected {
            return Err(Error::InvalidRequest(
                "only one criterion can return a related id".to_string(),
            ));
        }
        self.related_id_selected = true;
        self.builder.add_select(table, column, SelectCategory::RelatedId)
    }

    fn emit_criteria(
        &mut self,
        queried: &str,
        current: TableId,
        criteria: &WhereCriteria,
    ) -> Result<(), Error> {
        for item in &criteria.items {
            self.builder.add_operator(item.connector);
            match &item.criterion {
                Criterion::Property(c) => self.emit_property(queried, current, c)?,
                Criterion::IdSet(c) => self.emit_id_set(queried, current, c)?,
                Criterion::Related(c) => self.emit_related(queried, current, c)?,
                Criterion::Group(nested) => {
                    self.builder.start_inner_group();
                    self.emit_criteria(queried, current, nested)?;
                    self.builder.end_inner_group()?;
                }
            }
        }
        Ok(())
    }

    fn emit_property(
        &mut self,
        queried: &str,
        current: TableId,
        criterion: &PropertyCriterion,
    ) -> Result<(), Error> {
        let owned = self.resolve(queried, &criterion.property)?;
        if owned.property.is_spatial() && !criterion.operator.is_unary() {
            return Err(Error::InvalidRequest(format!(
                "spatial property '{}' only supports null checks; filter with a polygon",
                criterion.property
            )));
        }
        let Some((table, binding)) = self.property_column(queried, current, owned)? else {
            debug!(class = %queried, property = %criterion.property, "dropping criterion on unbacked property");
            return Ok(());
        };

        let kind = match criterion.operator {
            Operator::Like | Operator::NotLike => ValueKind::String,
            _ => owned.property.kind,
        };
        let operand = coerce_operand(&criterion.operand, kind, &criterion.property)?;
        self.builder.add_where(
            table,
            &binding.column,
            criterion.operator,
            &operand,
            ColumnType::from(kind),
        )
    }

    fn emit_id_set(
        &mut self,
        queried: &str,
        current: TableId,
        criterion: &IdSetCriterion,
    ) -> Result<(), Error> {
        if criterion.ids.is_empty() {
            return Err(Error::InvalidRequest("id set is empty".to_string()));
        }
        let id = self.catalog.id_property(queried)?;
        let (table, binding) = self.property_column(queried, current, id)?.ok_or_else(|| {
            Error::Schema(format!(
                "instance-id property '{}' of class '{}' has no column",
                id.name(),
                queried
            ))
        })?;
        let kind = id.property.kind;

        self.builder.start_inner_group();
        for raw in &criterion.ids {
            let value = coerce_value(Value::String(raw.clone()), kind, id.name())?;
            self.builder.add_operator(LogicalOperator::Or);
            self.builder.add_where(
                table,
                &binding.column,
                Operator::Eq,
                &Operand::Value(value),
                ColumnType::from(kind),
            )?;
        }
        self.builder.end_inner_group()?;

        if !self.builder.has_order_by() {
            self.builder.add_order_by(table, &binding.column, true)?;
        }
        if criterion.return_matched_id {
            self.select_related_id(table, &binding.column)?;
        }
        Ok(())
    }

    /// Traverse a relationship with LEFT JOINs and filter on the related side.
    ///
    /// No DISTINCT is applied: when several related rows match, the queried
    /// row is returned once per match, each carrying its own related id when
    /// one is requested.
    fn emit_related(
        &mut self,
        queried: &str,
        current: TableId,
        criterion: &RelatedCriterion,
    ) -> Result<(), Error> {
        let catalog = self.catalog;
        let relationship = catalog.relationship(&criterion.relationship)?;
        let forward = criterion.direction == RelationshipDirection::Forward;
        let (near, far) = if forward {
            (&relationship.source_class, &relationship.target_class)
        } else {
            (&relationship.target_class, &relationship.source_class)
        };
        if !catalog.is_a(queried, near)? {
            return Err(Error::InvalidRequest(format!(
                "class '{}' cannot traverse relationship '{}' from '{}'",
                queried, relationship.name, near
            )));
        }
        let related = criterion.related_class.as_deref().unwrap_or(far.as_str());
        if !catalog.is_a(related, far)? {
            return Err(Error::InvalidRequest(format!(
                "class '{}' is not a '{}' and cannot end relationship '{}'",
                related, far, relationship.name
            )));
        }

        let near_table = self
            .planner
            .table_for(&mut self.builder, queried, current, near)?;
        let near_binding = catalog.table_binding(near, self.source)?;
        let far_binding = catalog.table_binding(far, self.source)?;

        let far_table = match &relationship.mapping {
            RelationshipMapping::ForeignKey {
                source_column,
                target_column,
            } => {
                let (near_column, far_column) = if forward {
                    (source_column, target_column)
                } else {
                    (target_column, source_column)
                };
                self.builder.add_left_join(TableDescriptor::joined(
                    far_binding.name.clone(),
                    near_table,
                    near_column.clone(),
                    far_column.clone(),
                ))?
            }
            RelationshipMapping::Intermediate {
                table,
                source_column,
                target_column,
            } => {
                let (near_link, far_link) = if forward {
                    (source_column, target_column)
                } else {
                    (target_column, source_column)
                };
                let link = self.builder.add_left_join(TableDescriptor::joined(
                    table.clone(),
                    near_table,
                    near_binding.key_column.clone(),
                    near_link.clone(),
                ))?;
                self.builder.add_left_join(TableDescriptor::joined(
                    far_binding.name.clone(),
                    link,
                    far_link.clone(),
                    far_binding.key_column.clone(),
                ))?
            }
        };
        let related_table = self
            .planner
            .table_for(&mut self.builder, far, far_table, related)?;

        if criterion.return_related_id {
            let id = catalog.id_property(related)?;
            let (table, binding) = self
                .property_column(related, related_table, id)?
                .ok_or_else(|| {
                    Error::Schema(format!(
                        "instance-id property '{}' of class '{}' has no column",
                        id.name(),
                        related
                    ))
                })?;
            self.select_related_id(table, &binding.column)?;
        }

        if criterion.criteria.is_empty() {
            // Existence of any related row
            let key = &catalog.table_binding(related, self.source)?.key_column;
            self.builder.add_where(
                related_table,
                key,
                Operator::IsNotNull,
                &Operand::None,
                ColumnType::String,
            )
        } else {
            self.builder.start_inner_group();
            self.emit_criteria(related, related_table, &criterion.criteria)?;
            self.builder.end_inner_group()
        }
    }
}

fn coerce_value(value: Value, kind: ValueKind, property: &str) -> Result<Value, Error> {
    value
        .coerce(kind)
        .map_err(|e| Error::InvalidRequest(format!("criterion on '{}': {}", property, e)))
}

fn coerce_operand(operand: &Operand, kind: ValueKind, property: &str) -> Result<Operand, Error> {
    Ok(match operand {
        Operand::None => Operand::None,
        Operand::Value(value) => Operand::Value(coerce_value(value.clone(), kind, property)?),
        Operand::List(values) => Operand::List(
            values
                .iter()
                .map(|v| coerce_value(v.clone(), kind, property))
                .collect::<Result<Vec<_>, _>>()?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        BBoxColumns, ClassDef, ColumnBinding, JoinTable, PropertyDef, RelationshipDef,
        SchemaBundle, SpatialColumn,
    };
    use crate::sql::{Dialect, PropertySlot};
    use georm_proto::{OrderSpec, PolygonDescriptor, RelatedCriterion};
    use pretty_assertions::assert_eq;

    fn col(name: &str) -> ColumnBinding {
        ColumnBinding::new(name)
    }

    fn catalog() -> Catalog {
        Catalog::new(
            SchemaBundle::new()
                .with_class(
                    ClassDef::new("Item")
                        .with_table("items", "id")
                        .with_id_property("Id")
                        .with_property(PropertyDef::new("Id", ValueKind::String).with_column(col("id")))
                        .with_property(
                            PropertyDef::new("Name", ValueKind::String).with_column(col("name")),
                        )
                        .with_property(PropertyDef::new("Rating", ValueKind::Int32))
                        .queryable(),
                )
                .with_class(
                    ClassDef::new("Image")
                        .with_base("Item")
                        .with_table("images", "item_id")
                        .with_stream_column("thumbnail")
                        .with_property(
                            PropertyDef::new("Cloud", ValueKind::Double).with_column(col("cloud")),
                        )
                        .with_property(
                            PropertyDef::new("Footprint", ValueKind::Polygon).with_column(
                                col("footprint").with_spatial(
                                    SpatialColumn::default().with_bbox(BBoxColumns::prefixed("fp")),
                                ),
                            ),
                        )
                        .with_property(
                            PropertyDef::new("Title", ValueKind::String).with_column(
                                col("title").with_join(JoinTable::new("image_meta", "image_id", "item_id")),
                            ),
                        )
                        .queryable(),
                )
                .with_class(
                    ClassDef::new("Sensor")
                        .with_table("sensors", "id")
                        .with_id_property("Id")
                        .with_property(PropertyDef::new("Id", ValueKind::Int64).with_column(col("id")))
                        .with_property(
                            PropertyDef::new("Kind", ValueKind::String).with_column(col("kind")),
                        )
                        .queryable(),
                )
                .with_class(
                    ClassDef::new("Tag")
                        .with_table("tags", "id")
                        .with_id_property("Id")
                        .with_property(PropertyDef::new("Id", ValueKind::String).with_column(col("id")))
                        .with_property(
                            PropertyDef::new("Label", ValueKind::String).with_column(col("label")),
                        ),
                )
                .with_relationship(RelationshipDef::foreign_key(
                    "CapturedBy",
                    "Image",
                    "sensor_id",
                    "Sensor",
                    "id",
                ))
                .with_relationship(RelationshipDef::intermediate(
                    "Tagged",
                    "Item",
                    "Tag",
                    "item_tags",
                    "item_id",
                    "tag_id",
                )),
        )
        .unwrap()
    }

    fn compile(request: QueryRequest) -> Result<CompiledQuery, Error> {
        let catalog = catalog();
        QueryCompiler::new(&catalog, CompilerConfig::default()).compile(&request)
    }

    #[test]
    fn test_select_all_with_inherited_join() {
        let compiled = compile(QueryRequest::new("Image").with_select(["Name", "Cloud"])).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t1.\"name\", t0.\"cloud\", t1.\"id\" FROM \"images\" t0 \
             LEFT JOIN \"items\" t1 ON t1.\"id\" = t0.\"item_id\""
        );
        assert_eq!(compiled.id_property, "Id");
        assert_eq!(compiled.read_plan.property("Id"), Some(PropertySlot::Scalar(2)));
        assert!(compiled.count_sql.is_none());
    }

    #[test]
    fn test_unbacked_property_skipped() {
        let compiled = compile(QueryRequest::new("Item").with_select(["Rating", "Name"])).unwrap();
        assert_eq!(compiled.sql, "SELECT t0.\"name\", t0.\"id\" FROM \"items\" t0");
        assert!(!compiled.read_plan.has_property("Rating"));
        let names: Vec<_> = compiled.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Name", "Id"]);
    }

    #[test]
    fn test_unknown_and_unqueryable() {
        let err = compile(QueryRequest::new("Item").with_select(["Nope"])).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let err = compile(QueryRequest::new("Tag")).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_secondary_join_table() {
        let compiled = compile(QueryRequest::new("Image").with_select(["Title"])).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t1.\"title\", t2.\"id\" FROM \"images\" t0 \
             LEFT JOIN \"image_meta\" t1 ON t1.\"image_id\" = t0.\"item_id\" \
             LEFT JOIN \"items\" t2 ON t2.\"id\" = t0.\"item_id\""
        );
    }

    #[test]
    fn test_criteria_are_coerced() {
        let compiled = compile(
            QueryRequest::new("Sensor")
                .with_select(["Kind"])
                .filter(Criterion::eq("Id", "42"))
                .filter(Criterion::like("Kind", "SAR%")),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.\"kind\", t0.\"id\" FROM \"sensors\" t0 \
             WHERE t0.\"id\" = @p0 AND t0.\"kind\" LIKE @p1"
        );
        assert_eq!(compiled.parameters[0].value, Value::Int64(42));
        assert_eq!(compiled.parameters[0].column_type, ColumnType::Int64);

        let err = compile(QueryRequest::new("Sensor").filter(Criterion::eq("Id", "abc"))).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_unbacked_criterion_dropped() {
        let compiled = compile(
            QueryRequest::new("Item")
                .with_select(["Name"])
                .filter(Criterion::eq("Rating", 3))
                .filter(Criterion::eq("Name", "x")),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.\"name\", t0.\"id\" FROM \"items\" t0 WHERE t0.\"name\" = @p0"
        );
    }

    #[test]
    fn test_id_set_injects_order() {
        let compiled = compile(
            QueryRequest::new("Item")
                .with_select(["Id"])
                .filter(Criterion::ids(["a", "b", "c"])),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.\"id\" FROM \"items\" t0 \
             WHERE (t0.\"id\" = @p0 OR t0.\"id\" = @p1 OR t0.\"id\" = @p2) \
             ORDER BY t0.\"id\" ASC"
        );
        let values: Vec<_> = compiled.parameters.iter().map(|p| p.value.clone()).collect();
        assert_eq!(values, vec![Value::from("a"), Value::from("b"), Value::from("c")]);

        let err = compile(QueryRequest::new("Item").filter(Criterion::ids(Vec::<String>::new())))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_id_set_keeps_explicit_order_and_returns_matched_id() {
        let ids = match Criterion::ids(["a"]) {
            Criterion::IdSet(ids) => ids.with_matched_id(),
            _ => unreachable!(),
        };
        let compiled = compile(
            QueryRequest::new("Item")
                .with_select(["Id"])
                .with_order(OrderSpec::desc("Name"))
                .filter(ids.into()),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.\"id\", t0.\"id\" FROM \"items\" t0 WHERE (t0.\"id\" = @p0) \
             ORDER BY t0.\"name\" DESC"
        );
        assert_eq!(compiled.read_plan.related_id(), Some(1));
    }

    #[test]
    fn test_foreign_key_traversal() {
        let compiled = compile(
            QueryRequest::new("Image").with_select(["Cloud"]).filter(
                RelatedCriterion::new("CapturedBy")
                    .with_criteria(WhereCriteria::single(Criterion::eq("Kind", "SAR")))
                    .into(),
            ),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.\"cloud\", t1.\"id\" FROM \"images\" t0 \
             LEFT JOIN \"items\" t1 ON t1.\"id\" = t0.\"item_id\" \
             LEFT JOIN \"sensors\" t2 ON t2.\"id\" = t0.\"sensor_id\" \
             WHERE (t2.\"kind\" = @p0)"
        );
    }

    #[test]
    fn test_intermediate_traversal() {
        let compiled = compile(
            QueryRequest::new("Image").with_select(["Cloud"]).filter(
                RelatedCriterion::new("Tagged")
                    .with_related_id()
                    .into(),
            ),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.\"cloud\", t1.\"id\", t3.\"id\" FROM \"images\" t0 \
             LEFT JOIN \"items\" t1 ON t1.\"id\" = t0.\"item_id\" \
             LEFT JOIN \"item_tags\" t2 ON t2.\"item_id\" = t1.\"id\" \
             LEFT JOIN \"tags\" t3 ON t3.\"id\" = t2.\"tag_id\" \
             WHERE t3.\"id\" IS NOT NULL"
        );

        // Sensor is not an endpoint of Tagged
        let err = compile(
            QueryRequest::new("Sensor").filter(RelatedCriterion::new("Tagged").backward().into()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_polygon_without_native_spatial() {
        let polygon = PolygonDescriptor::rectangle(0.0, 0.0, 1.0, 1.0);
        let compiled = compile(
            QueryRequest::new("Image")
                .with_select(["Cloud"])
                .with_polygon(polygon.clone())
                .with_criteria(
                    WhereCriteria::single(Criterion::lt("Cloud", 0.5))
                        .or(Criterion::is_null("Cloud")),
                ),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.\"cloud\", t1.\"id\", t0.\"footprint\", t0.\"footprintSrid\" \
             FROM \"images\" t0 LEFT JOIN \"items\" t1 ON t1.\"id\" = t0.\"item_id\" \
             WHERE (t0.\"cloud\" < @p0 OR t0.\"cloud\" IS NULL) \
             AND (t0.\"fpMinX\" <= @p1 AND t0.\"fpMaxX\" >= @p2 AND t0.\"fpMinY\" <= @p3 AND t0.\"fpMaxY\" >= @p4)"
        );
        let filter = compiled.spatial_filter.unwrap();
        assert!(filter.strip_property);
        assert_eq!(filter.polygon, polygon);
    }

    #[test]
    fn test_polygon_with_native_spatial() {
        let catalog = catalog();
        let compiler = QueryCompiler::new(&catalog, CompilerConfig::new(Dialect::SqlServer));
        let compiled = compiler
            .compile(
                &QueryRequest::new("Image")
                    .with_select(["Footprint"])
                    .with_polygon(PolygonDescriptor::rectangle(0.0, 0.0, 1.0, 1.0))
                    .paging(10, 5)
                    .with_count(),
            )
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t0.[footprint].STAsText(), t0.[footprint].STSrid, t1.[id] \
             FROM [images] t0 LEFT JOIN [items] t1 ON t1.[id] = t0.[item_id] \
             WHERE t0.[footprint].STIntersects(geometry::STGeomFromText(@p0, @p1)) = 1 \
             ORDER BY t1.[id] ASC OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
        assert_eq!(
            compiled.count_sql.as_deref(),
            Some(
                "SELECT COUNT(*) FROM [images] t0 LEFT JOIN [items] t1 ON t1.[id] = t0.[item_id] \
                 WHERE t0.[footprint].STIntersects(geometry::STGeomFromText(@p0, @p1)) = 1"
            )
        );
        assert!(compiled.spatial_filter.is_none());
        assert_eq!(compiled.parameters[1].value, Value::Int32(4326));
    }

    #[test]
    fn test_polygon_needs_spatial_property() {
        let err = compile(
            QueryRequest::new("Sensor").with_polygon(PolygonDescriptor::rectangle(0.0, 0.0, 1.0, 1.0)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let err = compile(
            QueryRequest::new("Image").with_polygon(PolygonDescriptor::new(vec![[0.0, 0.0], [1.0, 1.0]])),
        )
        .unwrap_err();
        assert_eq!(err.kind(), georm_proto::ErrorKind::User);
    }

    #[test]
    fn test_stream_and_extras() {
        let catalog = catalog();
        let compiler = QueryCompiler::new(&catalog, CompilerConfig::default());
        let options = CompileOptions::default()
            .with_extra(ExtraSelect::column("Source", ColumnType::String));
        let compiled = compiler
            .compile_with(
                &QueryRequest::new("Image").with_select(["Id"]).with_stream(),
                &options,
            )
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT t1.\"id\", t0.\"thumbnail\", t0.\"Source\" FROM \"images\" t0 \
             LEFT JOIN \"items\" t1 ON t1.\"id\" = t0.\"item_id\""
        );
        assert_eq!(compiled.read_plan.stream(), Some(1));
        assert_eq!(compiled.read_plan.extra("Source"), Some((2, ColumnType::String)));
    }

    #[test]
    fn test_order_by_spatial_rejected() {
        let err = compile(QueryRequest::new("Image").with_order(OrderSpec::asc("Footprint")))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
