//! Static entity and relationship metadata.
//!
//! One [`EntitySchema`] per queryable entity. The registry is built once on
//! first access and never mutated, so lookups hand out `&'static` references.
//!
//! ```text
//! persons ──companies──────▶ companies      (entity method)
//!    │    ──opportunities──▶ opportunities  (entity method)
//!    │    ──interactions───▶ interactions   (global service, person_id)
//!    └─── ──notes──────────▶ notes          (global service, person_id)
//! ```

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;

/// How related records are fetched for one source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "fetch_strategy", rename_all = "snake_case")]
pub enum FetchStrategy {
    /// The source entity exposes an accessor returning related ids directly.
    EntityMethod { method: &'static str },
    /// One filtered list call against another service per source record.
    GlobalService {
        service: &'static str,
        filter_field: &'static str,
    },
}

impl FetchStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            FetchStrategy::EntityMethod { .. } => "entity_method",
            FetchStrategy::GlobalService { .. } => "global_service",
        }
    }

    pub fn method_or_service(&self) -> &'static str {
        match self {
            FetchStrategy::EntityMethod { method } => method,
            FetchStrategy::GlobalService { service, .. } => service,
        }
    }

    pub fn filter_field(&self) -> Option<&'static str> {
        match self {
            FetchStrategy::EntityMethod { .. } => None,
            FetchStrategy::GlobalService { filter_field, .. } => Some(filter_field),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// A named relationship from one entity to another.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipDef {
    pub target_entity: &'static str,
    /// Available strategies. Never empty.
    pub strategies: Vec<FetchStrategy>,
    pub cardinality: Cardinality,
    pub requires_n_plus_1: bool,
}

impl RelationshipDef {
    fn entity_method(target_entity: &'static str, method: &'static str) -> Self {
        Self {
            target_entity,
            strategies: vec![FetchStrategy::EntityMethod { method }],
            cardinality: Cardinality::Many,
            requires_n_plus_1: true,
        }
    }

    fn global_service(
        target_entity: &'static str,
        service: &'static str,
        filter_field: &'static str,
    ) -> Self {
        Self {
            target_entity,
            strategies: vec![FetchStrategy::GlobalService {
                service,
                filter_field,
            }],
            cardinality: Cardinality::Many,
            requires_n_plus_1: true,
        }
    }

    fn or_global_service(mut self, service: &'static str, filter_field: &'static str) -> Self {
        self.strategies.push(FetchStrategy::GlobalService {
            service,
            filter_field,
        });
        self
    }

    /// The strategy the planner uses: `entity_method` whenever one exists.
    pub fn fetch_strategy(&self) -> &FetchStrategy {
        self.strategies
            .iter()
            .find(|s| matches!(s, FetchStrategy::EntityMethod { .. }))
            .unwrap_or(&self.strategies[0])
    }

    pub fn method_or_service(&self) -> &'static str {
        self.fetch_strategy().method_or_service()
    }

    pub fn filter_field(&self) -> Option<&'static str> {
        self.fetch_strategy().filter_field()
    }
}

/// How the base records of an entity are listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityFetch {
    /// A single paginated list over the whole entity.
    Global,
    /// One paginated list per parent; the parent is selected in `where`.
    RequiresParent {
        filter_field: &'static str,
        name_field: &'static str,
    },
}

/// Static metadata for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySchema {
    pub name: &'static str,
    pub service_attr: &'static str,
    pub id_field: &'static str,
    pub filterable_fields: Vec<&'static str>,
    pub computed_fields: Vec<&'static str>,
    pub relationships: BTreeMap<&'static str, RelationshipDef>,
    pub api_version: &'static str,
    pub fetch: EntityFetch,
}

impl EntitySchema {
    fn new(name: &'static str, filterable_fields: Vec<&'static str>) -> Self {
        Self {
            name,
            service_attr: name,
            id_field: "id",
            filterable_fields,
            computed_fields: Vec::new(),
            relationships: BTreeMap::new(),
            api_version: "v2",
            fetch: EntityFetch::Global,
        }
    }

    fn computed(mut self, fields: Vec<&'static str>) -> Self {
        self.computed_fields = fields;
        self
    }

    fn relationship(mut self, name: &'static str, def: RelationshipDef) -> Self {
        self.relationships.insert(name, def);
        self
    }

    pub fn requires_parent(&self) -> bool {
        matches!(self.fetch, EntityFetch::RequiresParent { .. })
    }

    fn has_field(&self, name: &str) -> bool {
        name == self.id_field
            || self.filterable_fields.contains(&name)
            || self.computed_fields.contains(&name)
    }
}

/// A computed enrichment merged into each record (`expand`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpansionDef {
    pub name: &'static str,
    pub description: &'static str,
    /// Supported entity → field holding the id passed to the client.
    pub id_fields: BTreeMap<&'static str, &'static str>,
}

static ENTITIES: Lazy<BTreeMap<&'static str, EntitySchema>> = Lazy::new(|| {
    let persons = EntitySchema::new(
        "persons",
        vec![
            "firstName",
            "lastName",
            "primaryEmail",
            "emails",
            "type",
            "organizationIds",
            "createdAt",
        ],
    )
    .computed(vec!["firstEmail", "lastEmail"])
    .relationship(
        "companies",
        RelationshipDef::entity_method("companies", "get_associated_company_ids"),
    )
    .relationship(
        "opportunities",
        RelationshipDef::entity_method("opportunities", "get_associated_opportunity_ids"),
    )
    .relationship(
        "interactions",
        RelationshipDef::global_service("interactions", "interactions", "person_id"),
    )
    .relationship(
        "notes",
        RelationshipDef::global_service("notes", "notes", "person_id"),
    )
    .relationship(
        "listEntries",
        RelationshipDef::entity_method("listEntries", "get_list_entries"),
    );

    let companies = EntitySchema::new(
        "companies",
        vec!["name", "domain", "domains", "personIds", "createdAt"],
    )
    .relationship(
        "people",
        RelationshipDef::entity_method("persons", "get_associated_person_ids")
            .or_global_service("persons", "company_id"),
    )
    .relationship(
        "opportunities",
        RelationshipDef::entity_method("opportunities", "get_associated_opportunity_ids"),
    )
    .relationship(
        "interactions",
        RelationshipDef::global_service("interactions", "interactions", "company_id"),
    )
    .relationship(
        "notes",
        RelationshipDef::global_service("notes", "notes", "company_id"),
    )
    .relationship(
        "listEntries",
        RelationshipDef::entity_method("listEntries", "get_list_entries"),
    );

    let opportunities = EntitySchema::new(
        "opportunities",
        vec!["name", "listId", "personIds", "organizationIds", "createdAt"],
    )
    .relationship(
        "persons",
        RelationshipDef::entity_method("persons", "get_associated_person_ids"),
    )
    .relationship(
        "companies",
        RelationshipDef::entity_method("companies", "get_associated_company_ids"),
    )
    .relationship(
        "notes",
        RelationshipDef::global_service("notes", "notes", "opportunity_id"),
    );

    let mut list_entries = EntitySchema::new(
        "listEntries",
        vec![
            "listId",
            "listName",
            "entityId",
            "entityType",
            "entity",
            "creatorId",
            "createdAt",
        ],
    );
    list_entries.service_attr = "lists";
    list_entries.fetch = EntityFetch::RequiresParent {
        filter_field: "listId",
        name_field: "listName",
    };

    let interactions = EntitySchema::new(
        "interactions",
        vec!["type", "subject", "date", "personIds", "direction", "createdAt"],
    )
    .relationship(
        "persons",
        RelationshipDef::entity_method("persons", "get_associated_person_ids"),
    );

    let notes = EntitySchema::new(
        "notes",
        vec![
            "content",
            "creatorId",
            "personIds",
            "organizationIds",
            "opportunityIds",
            "createdAt",
        ],
    );

    [persons, companies, opportunities, list_entries, interactions, notes]
        .into_iter()
        .map(|schema| (schema.name, schema))
        .collect()
});

static EXPANSIONS: Lazy<BTreeMap<&'static str, ExpansionDef>> = Lazy::new(|| {
    let interaction_dates = ExpansionDef {
        name: "interactionDates",
        description: "Last and next interaction dates with team member details",
        id_fields: [
            ("persons", "id"),
            ("companies", "id"),
            ("listEntries", "entityId"),
        ]
        .into_iter()
        .collect(),
    };
    [(interaction_dates.name, interaction_dates)]
        .into_iter()
        .collect()
});

/// Look up an entity by name.
pub fn get_entity_schema(name: &str) -> Option<&'static EntitySchema> {
    ENTITIES.get(name)
}

/// Look up a relationship on an entity.
pub fn get_relationship(entity: &str, name: &str) -> Option<&'static RelationshipDef> {
    get_entity_schema(entity)?.relationships.get(name)
}

/// All entity names, sorted.
pub fn get_supported_entities() -> Vec<&'static str> {
    ENTITIES.keys().copied().collect()
}

/// Relationship names of an entity, sorted. Empty for unknown entities.
pub fn get_entity_relationships(entity: &str) -> Vec<&'static str> {
    get_entity_schema(entity)
        .map(|schema| schema.relationships.keys().copied().collect())
        .unwrap_or_default()
}

/// Look up an expansion by name.
pub fn get_expansion(name: &str) -> Option<&'static ExpansionDef> {
    EXPANSIONS.get(name)
}

/// All expansion names, sorted.
pub fn get_supported_expansions() -> Vec<&'static str> {
    EXPANSIONS.keys().copied().collect()
}

/// Check whether `path` may be referenced in a query over `entity`.
///
/// Accepts exact filterable or computed fields, the id field, any
/// `fields.*` path, and `<relationship>._count`. Array indices are ignored
/// and nested paths are accepted when their first segment is a known field.
pub fn is_valid_field_path(entity: &str, path: &str) -> bool {
    let Some(schema) = get_entity_schema(entity) else {
        return false;
    };

    if path.starts_with("fields.") {
        return true;
    }

    if let Some(rel) = path.strip_suffix("._count") {
        return schema.relationships.contains_key(rel);
    }

    let base = strip_indices(path);
    if schema.has_field(&base) {
        return true;
    }

    let first = base.split('.').next().unwrap_or_default();
    first != base && schema.has_field(first)
}

fn strip_indices(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut depth = 0usize;
    for c in path.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}
