//! Validated, indexed view over a schema bundle.

use std::collections::{HashMap, HashSet};

use super::{
    BindingSource, ClassDef, PropertyDef, RelationshipDef, SchemaBundle, TableBinding,
};
use crate::error::Error;

/// A property together with the class that declares it.
#[derive(Debug, Clone, Copy)]
pub struct OwnedProperty<'a> {
    pub owner: &'a ClassDef,
    pub property: &'a PropertyDef,
}

impl<'a> OwnedProperty<'a> {
    pub fn name(&self) -> &'a str {
        &self.property.name
    }
}

/// The schema store consumed by the compiler and the cache.
///
/// Construction validates every typed binding, so lookups during compilation
/// only fail on conditions that depend on the query (unknown names, multiple
/// base classes on the walked path, ambiguous derived matches).
#[derive(Debug, Clone)]
pub struct Catalog {
    classes: HashMap<String, ClassDef>,
    /// Class names in declaration order.
    order: Vec<String>,
    /// Directly derived classes, in declaration order.
    derived: HashMap<String, Vec<String>>,
    relationships: HashMap<String, RelationshipDef>,
}

impl Catalog {
    /// Index and validate a schema bundle.
    pub fn new(bundle: SchemaBundle) -> Result<Self, Error> {
        let mut classes = HashMap::new();
        let mut order = Vec::new();
        let mut derived: HashMap<String, Vec<String>> = HashMap::new();

        for class in bundle.classes {
            if classes.contains_key(&class.name) {
                return Err(Error::Schema(format!("duplicate class '{}'", class.name)));
            }
            for base in &class.base_classes {
                derived
                    .entry(base.clone())
                    .or_default()
                    .push(class.name.clone());
            }
            order.push(class.name.clone());
            classes.insert(class.name.clone(), class);
        }

        let mut relationships = HashMap::new();
        for relationship in bundle.relationships {
            if relationships.contains_key(&relationship.name) {
                return Err(Error::Schema(format!(
                    "duplicate relationship '{}'",
                    relationship.name
                )));
            }
            relationships.insert(relationship.name.clone(), relationship);
        }

        let catalog = Self {
            classes,
            order,
            derived,
            relationships,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), Error> {
        for name in &self.order {
            let class = &self.classes[name];

            for base in &class.base_classes {
                if !self.classes.contains_key(base) {
                    return Err(Error::Schema(format!(
                        "class '{}' derives from unknown class '{}'",
                        class.name, base
                    )));
                }
            }
            let lineage = self.lineage_lenient(class)?;

            for property in &class.properties {
                for binding in [&property.column, &property.cache_column].into_iter().flatten() {
                    if let Some(join) = &binding.join {
                        if join.keys().is_none() {
                            return Err(Error::Schema(format!(
                                "property '{}.{}' declares join table '{}' without both keys",
                                class.name, property.name, join.table
                            )));
                        }
                    }
                }
            }

            if class.queryable {
                let id_name = lineage
                    .iter()
                    .find_map(|c| c.id_property.as_deref())
                    .ok_or_else(|| {
                        Error::Schema(format!(
                            "queryable class '{}' has no instance-id property",
                            class.name
                        ))
                    })?;
                if !lineage.iter().any(|c| c.get_property(id_name).is_some()) {
                    return Err(Error::Schema(format!(
                        "instance-id property '{}' of class '{}' is not declared",
                        id_name, class.name
                    )));
                }
                if !lineage.iter().any(|c| c.table.is_some()) {
                    return Err(Error::Schema(format!(
                        "queryable class '{}' has no table binding",
                        class.name
                    )));
                }
            }
        }

        for relationship in self.relationships.values() {
            for end in [&relationship.source_class, &relationship.target_class] {
                if !self.classes.contains_key(end) {
                    return Err(Error::Schema(format!(
                        "relationship '{}' references unknown class '{}'",
                        relationship.name, end
                    )));
                }
            }
        }

        Ok(())
    }

    /// Class followed by its ancestors, following the first base at each
    /// level. Only used for load-time checks; query-time walks reject
    /// multiple bases.
    fn lineage_lenient<'a>(&'a self, class: &'a ClassDef) -> Result<Vec<&'a ClassDef>, Error> {
        let mut lineage = vec![class];
        let mut seen = HashSet::from([class.name.as_str()]);
        let mut current = class;
        while let Some(base) = current.base_classes.first() {
            if !seen.insert(base.as_str()) {
                return Err(Error::Schema(format!(
                    "class hierarchy of '{}' contains a cycle",
                    class.name
                )));
            }
            let Some(next) = self.classes.get(base) else {
                break;
            };
            lineage.push(next);
            current = next;
        }
        Ok(lineage)
    }

    /// Get a class by name.
    pub fn class(&self, name: &str) -> Result<&ClassDef, Error> {
        self.classes
            .get(name)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown class '{}'", name)))
    }

    /// Get a class by name, if present.
    pub fn get_class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// All class names in declaration order.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// The single base class of `name`, if any.
    pub fn base_class(&self, name: &str) -> Result<Option<&ClassDef>, Error> {
        let class = self.class(name)?;
        match class.base_classes.as_slice() {
            [] => Ok(None),
            [base] => self.class(base).map(Some),
            _ => Err(Error::Schema(format!(
                "class '{}' has {} base classes; only single inheritance is supported",
                name,
                class.base_classes.len()
            ))),
        }
    }

    /// Ancestors of `name`, nearest first.
    pub fn ancestors(&self, name: &str) -> Result<Vec<&ClassDef>, Error> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([name.to_string()]);
        let mut current = name.to_string();
        while let Some(base) = self.base_class(&current)? {
            if !seen.insert(base.name.clone()) {
                return Err(Error::Schema(format!(
                    "class hierarchy of '{}' contains a cycle",
                    name
                )));
            }
            current = base.name.clone();
            ancestors.push(base);
        }
        Ok(ancestors)
    }

    /// Classes deriving directly from `name`.
    pub fn derived_classes(&self, name: &str) -> &[String] {
        self.derived.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `class` is `ancestor` or derives from it.
    pub fn is_a(&self, class: &str, ancestor: &str) -> Result<bool, Error> {
        if class == ancestor {
            return Ok(true);
        }
        Ok(self.ancestors(class)?.iter().any(|c| c.name == ancestor))
    }

    /// Own and inherited properties of a class, root-most base first.
    pub fn properties(&self, name: &str) -> Result<Vec<OwnedProperty<'_>>, Error> {
        let class = self.class(name)?;
        let mut lineage = self.ancestors(name)?;
        lineage.reverse();
        lineage.push(class);

        Ok(lineage
            .into_iter()
            .flat_map(|owner| {
                owner
                    .properties
                    .iter()
                    .map(move |property| OwnedProperty { owner, property })
            })
            .collect())
    }

    /// Resolve a property visible from `class`.
    ///
    /// Own and inherited properties win. Otherwise the property may be declared
    /// on a derived class; a name declared on more than one derived branch is
    /// ambiguous.
    pub fn find_property(
        &self,
        class: &str,
        property: &str,
    ) -> Result<Option<OwnedProperty<'_>>, Error> {
        if let Some(found) = self
            .properties(class)?
            .into_iter()
            .rev()
            .find(|p| p.property.name == property)
        {
            return Ok(Some(found));
        }

        let mut matches = Vec::new();
        let mut stack: Vec<&str> = self.derived_classes(class).iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                continue;
            }
            let owner = self.class(name)?;
            if let Some(p) = owner.get_property(property) {
                matches.push(OwnedProperty { owner, property: p });
            }
            stack.extend(self.derived_classes(name).iter().map(String::as_str));
        }

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => {
                let mut owners: Vec<&str> = matches.iter().map(|m| m.owner.name.as_str()).collect();
                owners.sort_unstable();
                Err(Error::Schema(format!(
                    "property '{}' of class '{}' is ambiguous across derived classes {}",
                    property,
                    class,
                    owners.join(", ")
                )))
            }
        }
    }

    /// The instance-id property of a class, own or inherited.
    pub fn id_property(&self, class: &str) -> Result<OwnedProperty<'_>, Error> {
        let target = self.class(class)?;
        let id_name = std::iter::once(target)
            .chain(self.ancestors(class)?)
            .find_map(|c| c.id_property.as_deref())
            .ok_or_else(|| {
                Error::Schema(format!("class '{}' has no instance-id property", class))
            })?;

        self.properties(class)?
            .into_iter()
            .find(|p| p.property.name == id_name)
            .ok_or_else(|| {
                Error::Schema(format!(
                    "instance-id property '{}' of class '{}' is not declared",
                    id_name, class
                ))
            })
    }

    /// Table storing rows of `class` for a source: its own or the nearest
    /// ancestor's.
    pub fn table_binding(&self, class: &str, source: BindingSource) -> Result<&TableBinding, Error> {
        let target = self.class(class)?;
        if let Some(table) = target.own_table(source) {
            return Ok(table);
        }
        self.ancestors(class)?
            .into_iter()
            .find_map(|c| c.own_table(source))
            .ok_or_else(|| {
                let what = match source {
                    BindingSource::Primary => "table",
                    BindingSource::Cache => "cache table",
                };
                Error::Schema(format!("class '{}' has no {} binding", class, what))
            })
    }

    /// Stream payload column of `class` for a source, with its declaring class.
    pub fn stream_column(
        &self,
        class: &str,
        source: BindingSource,
    ) -> Result<Option<(&ClassDef, &str)>, Error> {
        let target = self.class(class)?;
        Ok(std::iter::once(target)
            .chain(self.ancestors(class)?)
            .find_map(|c| c.own_stream_column(source).map(|col| (c, col))))
    }

    /// The spatial property of a class, own before inherited.
    pub fn spatial_property(&self, class: &str) -> Result<Option<OwnedProperty<'_>>, Error> {
        Ok(self
            .properties(class)?
            .into_iter()
            .rev()
            .find(|p| p.property.is_spatial()))
    }

    /// Get a relationship by name.
    pub fn relationship(&self, name: &str) -> Result<&RelationshipDef, Error> {
        self.relationships
            .get(name)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown relationship '{}'", name)))
    }
}
