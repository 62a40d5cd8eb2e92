use crmql::schema::{
    self, get_entity_relationships, get_entity_schema, get_expansion, get_relationship,
    get_supported_entities, is_valid_field_path, EntityFetch, FetchStrategy,
};

#[test]
fn test_supported_entities() {
    let entities = get_supported_entities();
    for name in ["persons", "companies", "opportunities", "listEntries", "interactions", "notes"] {
        assert!(entities.contains(&name), "missing {}", name);
    }
}

#[test]
fn test_unknown_entity() {
    assert!(get_entity_schema("deals").is_none());
    assert!(get_entity_relationships("deals").is_empty());
    assert!(!is_valid_field_path("deals", "name"));
}

#[test]
fn test_list_entries_require_parent() {
    let entity = get_entity_schema("listEntries").unwrap();
    assert!(entity.requires_parent());
    assert_eq!(
        entity.fetch,
        EntityFetch::RequiresParent {
            filter_field: "listId",
            name_field: "listName",
        }
    );
    assert!(!get_entity_schema("persons").unwrap().requires_parent());
}

#[test]
fn test_entity_method_preferred_over_global_service() {
    let rel = get_relationship("companies", "people").unwrap();
    assert_eq!(rel.strategies.len(), 2);
    assert_eq!(
        rel.fetch_strategy(),
        &FetchStrategy::EntityMethod {
            method: "get_associated_person_ids"
        }
    );
    assert_eq!(rel.filter_field(), None);
}

#[test]
fn test_global_service_relationship() {
    let rel = get_relationship("persons", "interactions").unwrap();
    assert_eq!(rel.method_or_service(), "interactions");
    assert_eq!(rel.filter_field(), Some("person_id"));
    assert!(rel.requires_n_plus_1);
}

#[test]
fn test_field_paths() {
    assert!(is_valid_field_path("persons", "id"));
    assert!(is_valid_field_path("persons", "firstName"));
    assert!(is_valid_field_path("persons", "firstEmail"));
    assert!(is_valid_field_path("persons", "fields.Anything Goes"));
    assert!(is_valid_field_path("persons", "companies._count"));
    assert!(is_valid_field_path("persons", "emails[0]"));
    assert!(is_valid_field_path("listEntries", "entity.name"));

    assert!(!is_valid_field_path("persons", "nickname"));
    assert!(!is_valid_field_path("persons", "widgets._count"));
}

#[test]
fn test_interaction_dates_expansion() {
    let def = get_expansion("interactionDates").unwrap();
    assert_eq!(def.id_fields.get("persons"), Some(&"id"));
    assert_eq!(def.id_fields.get("listEntries"), Some(&"entityId"));
    assert!(def.id_fields.get("notes").is_none());
    assert_eq!(schema::get_supported_expansions(), vec!["interactionDates"]);
}
