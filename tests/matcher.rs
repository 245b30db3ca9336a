mod common;

use csv_migrate::{
    automap::{load_mappings, save_mappings},
    matcher::{
        CatalogRecord, EXACT_SCORE, IdentifierCatalog, MappingSource, ValueMapping,
        distinct_values, unmapped_values,
    },
    parser::parse_csv_text,
};
use proptest::prelude::*;

use common::TestWorkspace;

const CATALOG_CSV: &str = "\
ID,Full Name,Login,E-Mail
u1,Ada Lovelace,ada,ada@example.com
u2,Grace Hopper,ghopper,grace@example.com
,No Id,nobody,
u3,José Álvarez,jalvarez,
";

#[test]
fn exact_username_wins_over_name_containment() {
    let catalog = IdentifierCatalog::new(vec![
        CatalogRecord::new("u1").with_username("jo"),
        CatalogRecord::new("u2").with_full_name("Jo Smith"),
    ]);
    let best = catalog.best_match("jo").expect("match");
    assert_eq!(best.record.id, "u1");
    assert_eq!(best.score, EXACT_SCORE);
}

#[test]
fn catalog_loads_from_csv_with_loose_headers() {
    let table = parse_csv_text(CATALOG_CSV, false).unwrap();
    // "Full Name" is not one of the recognized spellings.
    let catalog = IdentifierCatalog::from_table(&table);
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.records()[0].username.as_deref(), Some("ada"));
    assert_eq!(catalog.records()[0].email.as_deref(), Some("ada@example.com"));
    assert_eq!(catalog.records()[0].full_name, None);
    assert!(catalog.contains_id("u3"));
}

#[test]
fn auto_map_resolves_names_emails_and_accents() {
    let catalog = IdentifierCatalog::new(vec![
        CatalogRecord::new("u1")
            .with_full_name("Ada Lovelace")
            .with_email("ada@example.com"),
        CatalogRecord::new("u3")
            .with_full_name("José Álvarez")
            .with_username("jalvarez"),
    ]);
    let upload = parse_csv_text(
        "owner\nADA@EXAMPLE.COM\n jose alvarez \nLovelace\nunknown person\n\n  \nADA@EXAMPLE.COM\n",
        false,
    )
    .unwrap();

    let values = distinct_values(&upload, "owner");
    assert_eq!(
        values,
        vec!["ADA@EXAMPLE.COM", "jose alvarez", "Lovelace", "unknown person"]
    );

    let mut mapping = ValueMapping::new();
    let added = mapping.auto_map(values.iter().map(String::as_str), &catalog);
    assert_eq!(added, 3);
    assert_eq!(mapping.get("ADA@EXAMPLE.COM"), Some("u1"));
    assert_eq!(mapping.get("jose alvarez"), Some("u3"));
    assert_eq!(mapping.get("Lovelace"), Some("u1"));
    assert_eq!(
        unmapped_values(&upload, "owner", &mapping),
        vec!["unknown person"]
    );
}

#[test]
fn mappings_persist_with_their_source() {
    let workspace = TestWorkspace::new();
    let catalog = IdentifierCatalog::new(vec![CatalogRecord::new("u1").with_username("ada")]);
    let mut mapping = ValueMapping::new();
    mapping.set_manual("Boss", "u9");
    mapping.auto_map(["ada"], &catalog);

    let path = workspace.path().join("mappings.json");
    save_mappings(&mapping, &path).unwrap();
    let loaded = load_mappings(&path).unwrap();
    assert_eq!(loaded, mapping);
    assert_eq!(loaded.entry("Boss").unwrap().source, MappingSource::Manual);
    assert_eq!(loaded.entry("ada").unwrap().source, MappingSource::Auto);
}

fn catalog_strategy() -> impl Strategy<Value = Vec<CatalogRecord>> {
    prop::collection::vec(("[a-z]{1,6}", "[A-Za-z ]{0,12}"), 1..6).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(idx, (username, name))| {
                CatalogRecord::new(&format!("id{idx}"))
                    .with_username(&username)
                    .with_full_name(&name)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn auto_map_twice_changes_nothing(
        records in catalog_strategy(),
        raw in prop::collection::vec("[A-Za-z ]{0,10}", 0..10),
    ) {
        let catalog = IdentifierCatalog::new(records);
        let mut mapping = ValueMapping::new();
        mapping.auto_map(raw.iter().map(String::as_str), &catalog);
        let first = mapping.clone();
        let added = mapping.auto_map(raw.iter().map(String::as_str), &catalog);
        prop_assert_eq!(added, 0);
        prop_assert_eq!(mapping, first);
    }
}
