//! Query request and where-criteria types.
//!
//! A [`QueryRequest`] is an already-parsed object query: a target class, an
//! optional select list, a criteria tree, ordering, an optional spatial
//! polygon and paging. How a caller builds one is outside this crate; the
//! JSON form produced by serde is what the CLI reads from disk.

use serde::{Deserialize, Serialize};

use crate::polygon::PolygonDescriptor;
use crate::value::Value;

/// An object query against one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Class to search.
    pub class: String,
    /// Properties to return; `None` selects every property of the class.
    #[serde(default)]
    pub select: Option<Vec<String>>,
    /// Where-criteria tree.
    #[serde(default)]
    pub criteria: WhereCriteria,
    /// Ordering specification.
    #[serde(default)]
    pub order_by: Vec<OrderSpec>,
    /// Spatial filter.
    #[serde(default)]
    pub polygon: Option<PolygonDescriptor>,
    /// Also compute the total match count.
    #[serde(default)]
    pub include_count: bool,
    /// Also read the binary stream payload.
    #[serde(default)]
    pub include_stream: bool,
    /// Paging parameters.
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl QueryRequest {
    /// Create a query selecting every property of a class.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            select: None,
            criteria: WhereCriteria::default(),
            order_by: vec![],
            polygon: None,
            include_count: false,
            include_stream: false,
            pagination: None,
        }
    }

    /// Set the properties to select.
    pub fn with_select<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Set the where-criteria.
    pub fn with_criteria(mut self, criteria: WhereCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// AND a single criterion onto the existing criteria.
    pub fn filter(mut self, criterion: Criterion) -> Self {
        self.criteria = self.criteria.and(criterion);
        self
    }

    /// Add ordering.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set the spatial filter polygon.
    pub fn with_polygon(mut self, polygon: PolygonDescriptor) -> Self {
        self.polygon = Some(polygon);
        self
    }

    /// Request the total match count.
    pub fn with_count(mut self) -> Self {
        self.include_count = true;
        self
    }

    /// Request stream payloads.
    pub fn with_stream(mut self) -> Self {
        self.include_stream = true;
        self
    }

    /// Set pagination.
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Skip `skip` matches and return at most `take`.
    pub fn paging(self, skip: u32, take: u32) -> Self {
        self.with_pagination(Pagination::new(take, skip))
    }
}

/// Connector placed before a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

/// A flat sequence of criteria joined by connectors.
///
/// The connector of the first item is ignored. Nesting is expressed with
/// [`Criterion::Group`], which keeps AND/OR boundaries explicit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WhereCriteria {
    #[serde(default)]
    pub items: Vec<CriteriaItem>,
}

/// One criterion and the connector joining it to its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaItem {
    #[serde(default)]
    pub connector: LogicalOperator,
    pub criterion: Criterion,
}

impl WhereCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Criteria holding a single criterion.
    pub fn single(criterion: Criterion) -> Self {
        Self::new().and(criterion)
    }

    /// Append a criterion with an AND connector.
    pub fn and(mut self, criterion: Criterion) -> Self {
        self.items.push(CriteriaItem {
            connector: LogicalOperator::And,
            criterion,
        });
        self
    }

    /// Append a criterion with an OR connector.
    pub fn or(mut self, criterion: Criterion) -> Self {
        self.items.push(CriteriaItem {
            connector: LogicalOperator::Or,
            criterion,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// A node of the where-criteria tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Criterion {
    /// Compare a property against an operand.
    Property(PropertyCriterion),
    /// Match instances whose id is in a set.
    IdSet(IdSetCriterion),
    /// Match instances having a related object that satisfies nested criteria.
    Related(RelatedCriterion),
    /// Parenthesized sub-criteria.
    Group(WhereCriteria),
}

impl Criterion {
    fn property(property: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Criterion::Property(PropertyCriterion {
            property: property.into(),
            operator,
            operand,
        })
    }

    /// Create an equality criterion.
    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::property(property, Operator::Eq, Operand::Value(value.into()))
    }

    /// Create a not-equal criterion.
    pub fn ne(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::property(property, Operator::Ne, Operand::Value(value.into()))
    }

    /// Create a greater-than criterion.
    pub fn gt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::property(property, Operator::Gt, Operand::Value(value.into()))
    }

    /// Create a greater-than-or-equal criterion.
    pub fn ge(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::property(property, Operator::Ge, Operand::Value(value.into()))
    }

    /// Create a less-than criterion.
    pub fn lt(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::property(property, Operator::Lt, Operand::Value(value.into()))
    }

    /// Create a less-than-or-equal criterion.
    pub fn le(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::property(property, Operator::Le, Operand::Value(value.into()))
    }

    /// Create an IN criterion.
    pub fn in_values(property: impl Into<String>, values: Vec<Value>) -> Self {
        Self::property(property, Operator::In, Operand::List(values))
    }

    /// Create a NOT IN criterion.
    pub fn not_in_values(property: impl Into<String>, values: Vec<Value>) -> Self {
        Self::property(property, Operator::NotIn, Operand::List(values))
    }

    /// Create a LIKE criterion.
    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::property(
            property,
            Operator::Like,
            Operand::Value(Value::String(pattern.into())),
        )
    }

    /// Create a NOT LIKE criterion.
    pub fn not_like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::property(
            property,
            Operator::NotLike,
            Operand::Value(Value::String(pattern.into())),
        )
    }

    /// Create an IS NULL criterion.
    pub fn is_null(property: impl Into<String>) -> Self {
        Self::property(property, Operator::IsNull, Operand::None)
    }

    /// Create an IS NOT NULL criterion.
    pub fn is_not_null(property: impl Into<String>) -> Self {
        Self::property(property, Operator::IsNotNull, Operand::None)
    }

    /// Create an id-set criterion.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Criterion::IdSet(IdSetCriterion {
            ids: ids.into_iter().map(Into::into).collect(),
            return_matched_id: false,
        })
    }

    /// Create a group criterion.
    pub fn group(criteria: WhereCriteria) -> Self {
        Criterion::Group(criteria)
    }
}

/// Property comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCriterion {
    pub property: String,
    pub operator: Operator,
    #[serde(default)]
    pub operand: Operand,
}

/// Id-set membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdSetCriterion {
    /// Ids to match, in declaration order.
    pub ids: Vec<String>,
    /// Select the matched id into each record's related id.
    #[serde(default)]
    pub return_matched_id: bool,
}

impl IdSetCriterion {
    pub fn with_matched_id(mut self) -> Self {
        self.return_matched_id = true;
        self
    }
}

/// Direction of a relationship traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipDirection {
    /// From the relationship's source class to its target class.
    #[default]
    Forward,
    /// From the target class back to the source class.
    Backward,
}

/// Traversal to a related class with nested criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedCriterion {
    /// Relationship name in the schema.
    pub relationship: String,
    #[serde(default)]
    pub direction: RelationshipDirection,
    /// Narrow the related side to a derived class of the relationship end.
    #[serde(default)]
    pub related_class: Option<String>,
    /// Criteria evaluated against the related class.
    #[serde(default)]
    pub criteria: WhereCriteria,
    /// Select the related id into each record's related id.
    #[serde(default)]
    pub return_related_id: bool,
}

impl RelatedCriterion {
    pub fn new(relationship: impl Into<String>) -> Self {
        Self {
            relationship: relationship.into(),
            direction: RelationshipDirection::Forward,
            related_class: None,
            criteria: WhereCriteria::default(),
            return_related_id: false,
        }
    }

    pub fn backward(mut self) -> Self {
        self.direction = RelationshipDirection::Backward;
        self
    }

    pub fn with_related_class(mut self, class: impl Into<String>) -> Self {
        self.related_class = Some(class.into());
        self
    }

    pub fn with_criteria(mut self, criteria: WhereCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_related_id(mut self) -> Self {
        self.return_related_id = true;
        self
    }
}

impl From<RelatedCriterion> for Criterion {
    fn from(related: RelatedCriterion) -> Self {
        Criterion::Related(related)
    }
}

impl From<IdSetCriterion> for Criterion {
    fn from(ids: IdSetCriterion) -> Self {
        Criterion::IdSet(ids)
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
    /// Full-text match; no relational lowering exists.
    Matches,
}

impl Operator {
    /// SQL token for the operator, `None` when it has no relational form.
    pub fn as_sql(&self) -> Option<&'static str> {
        let sql = match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Matches => return None,
        };
        Some(sql)
    }

    /// Whether the operator takes a list operand.
    pub fn is_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// Whether the operator takes no operand.
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }
}

/// Right-hand side of a property comparison.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    #[default]
    None,
    List(Vec<Value>),
    Value(Value),
}

/// Order specification for sorting results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Property to order by.
    pub property: String,
    /// Sort direction.
    #[serde(default)]
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl OrderDirection {
    pub fn is_ascending(&self) -> bool {
        matches!(self, OrderDirection::Asc)
    }
}

/// Pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of results to return.
    pub limit: u32,
    /// Number of results to skip.
    #[serde(default)]
    pub offset: u32,
}

impl Pagination {
    /// Create pagination with limit and offset.
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Create pagination with just a limit.
    pub fn limit(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = QueryRequest::new("Image")
            .with_select(["Name", "Cloud"])
            .filter(Criterion::gt("Cloud", 10.0))
            .filter(Criterion::is_not_null("Name"))
            .with_order(OrderSpec::desc("Cloud"))
            .paging(20, 10)
            .with_count();

        assert_eq!(request.select.as_ref().unwrap().len(), 2);
        assert_eq!(request.criteria.len(), 2);
        assert_eq!(request.pagination, Some(Pagination::new(10, 20)));
        assert!(request.include_count);
        assert!(!request.include_stream);
    }

    #[test]
    fn test_operator_sql() {
        assert_eq!(Operator::Ne.as_sql(), Some("<>"));
        assert_eq!(Operator::NotIn.as_sql(), Some("NOT IN"));
        assert_eq!(Operator::Matches.as_sql(), None);
        assert!(Operator::In.is_list());
        assert!(Operator::IsNull.is_unary());
    }

    #[test]
    fn test_request_json_form() {
        let json = r#"{
            "class": "Image",
            "criteria": {"items": [
                {"criterion": {"type": "property", "property": "Cloud", "operator": "lt", "operand": 20}},
                {"connector": "or", "criterion": {"type": "group", "items": [
                    {"criterion": {"type": "id_set", "ids": ["a", "b"]}}
                ]}},
                {"criterion": {"type": "related", "relationship": "Collects", "direction": "backward"}}
            ]},
            "order_by": [{"property": "Name"}],
            "polygon": {"points": [[0, 0], [1, 0], [1, 1]]}
        }"#;

        let request: QueryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.criteria.len(), 3);
        assert_eq!(request.criteria.items[1].connector, LogicalOperator::Or);

        match &request.criteria.items[0].criterion {
            Criterion::Property(p) => {
                assert_eq!(p.operator, Operator::Lt);
                assert_eq!(p.operand, Operand::Value(Value::Int32(20)));
            }
            other => panic!("unexpected criterion {:?}", other),
        }
        match &request.criteria.items[1].criterion {
            Criterion::Group(inner) => assert!(matches!(
                inner.items[0].criterion,
                Criterion::IdSet(_)
            )),
            other => panic!("unexpected criterion {:?}", other),
        }
        match &request.criteria.items[2].criterion {
            Criterion::Related(r) => {
                assert_eq!(r.direction, RelationshipDirection::Backward);
                assert!(r.criteria.is_empty());
            }
            other => panic!("unexpected criterion {:?}", other),
        }
        assert!(request.order_by[0].direction.is_ascending());
        assert_eq!(request.polygon.unwrap().coordinate_system, "4326");
    }

    #[test]
    fn test_operand_forms() {
        let list: Operand = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(
            list,
            Operand::List(vec![Value::from("a"), Value::from("b")])
        );
        let none: Operand = serde_json::from_str("null").unwrap();
        assert_eq!(none, Operand::None);
    }
}
