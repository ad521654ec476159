use component_catalog::db::{CatalogStore, ComponentStore, Database, DescriptionStore, HistoryStore};
use component_catalog::error::{CatalogError, ErrorKind};
use component_catalog::models::*;
use speculate2::speculate;
use uuid::Uuid;

fn new_component(name: &str, kind: &str) -> NewComponent {
    NewComponent {
        name: name.to_string(),
        kind: kind.to_string(),
        status: ComponentStatus::Active,
        parent_id: None,
        description_ids: Vec::new(),
        child_ids: Vec::new(),
    }
}

fn content(name: &str, text: &str) -> DescriptionContent {
    DescriptionContent {
        name: name.to_string(),
        text: text.to_string(),
    }
}

fn history_for(component: &Component, action: HistoryAction) -> NewHistoryEntry {
    NewHistoryEntry {
        component: component.summary(),
        actor_id: "tester".to_string(),
        action,
        subcomponent: None,
        details: None,
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "components" {
        describe "insert_component" {
            it "assigns an id and starts at version zero" {
                let component = db.insert_component(new_component("Server", "hardware"))
                    .expect("Failed to insert component");

                assert_eq!(component.name, "Server");
                assert_eq!(component.kind, "hardware");
                assert_eq!(component.status, ComponentStatus::Active);
                assert_eq!(component.version, 0);
                assert!(component.description_ids.is_empty());
                assert!(component.child_ids.is_empty());
            }

            it "persists id lists in order" {
                let a = Uuid::new_v4();
                let b = Uuid::new_v4();
                let mut input = new_component("Rack", "furniture");
                input.description_ids = vec![b, a];

                let component = db.insert_component(input).unwrap();
                let found = db.find_component(component.id).unwrap();

                assert_eq!(found.description_ids, vec![b, a]);
            }
        }

        describe "find_component" {
            it "returns not found for unknown ids" {
                let id = Uuid::new_v4();
                let err = db.find_component(id).unwrap_err();

                assert!(matches!(err, CatalogError::NotFound { id: missing, .. } if missing == id));
            }
        }

        describe "find_all_components" {
            it "returns components in insertion order" {
                db.insert_component(new_component("b", "x")).unwrap();
                db.insert_component(new_component("a", "x")).unwrap();

                let names: Vec<_> = db.find_all_components().unwrap()
                    .into_iter()
                    .map(|c| c.name)
                    .collect();

                assert_eq!(names, vec!["b", "a"]);
            }
        }

        describe "update_component" {
            it "writes fields and advances the version" {
                let mut component = db.insert_component(new_component("Server", "hardware")).unwrap();
                component.name = "Server 2".to_string();
                component.status = ComponentStatus::Decommissioned;

                db.update_component(&mut component).expect("Failed to update");

                assert_eq!(component.version, 1);
                let found = db.find_component(component.id).unwrap();
                assert_eq!(found.name, "Server 2");
                assert_eq!(found.status, ComponentStatus::Decommissioned);
                assert_eq!(found.version, 1);
            }

            it "rejects a write based on a stale version" {
                let component = db.insert_component(new_component("Server", "hardware")).unwrap();
                let mut first = component.clone();
                let mut second = component.clone();

                first.name = "first".to_string();
                db.update_component(&mut first).unwrap();

                second.name = "second".to_string();
                let err = db.update_component(&mut second).unwrap_err();

                assert!(matches!(err, CatalogError::StaleWrite { expected: 0, .. }));
                assert_eq!(err.kind(), ErrorKind::Conflict);
                assert_eq!(db.find_component(component.id).unwrap().name, "first");
            }

            it "returns not found for a missing component" {
                let mut component = db.insert_component(new_component("Server", "hardware")).unwrap();
                db.delete_component(component.id).unwrap();

                let err = db.update_component(&mut component).unwrap_err();
                assert!(err.is_not_found());
            }
        }

        describe "delete_component" {
            it "removes the row" {
                let component = db.insert_component(new_component("Server", "hardware")).unwrap();
                db.delete_component(component.id).unwrap();

                assert!(db.find_component(component.id).unwrap_err().is_not_found());
            }

            it "returns not found for unknown ids" {
                assert!(db.delete_component(Uuid::new_v4()).unwrap_err().is_not_found());
            }
        }

        describe "find_description_owner" {
            it "finds the component listing the description" {
                let description = db.insert_description(content("serial", "X-1")).unwrap();
                let mut input = new_component("Server", "hardware");
                input.description_ids = vec![description.id];
                let owner = db.insert_component(input).unwrap();

                assert_eq!(db.find_description_owner(description.id).unwrap(), Some(owner.id));
            }

            it "returns none for unreferenced descriptions" {
                let description = db.insert_description(content("serial", "X-1")).unwrap();
                assert_eq!(db.find_description_owner(description.id).unwrap(), None);
            }
        }
    }

    describe "populated views" {
        it "resolves descriptions and children in stored order" {
            let first = db.insert_description(content("first", "1")).unwrap();
            let second = db.insert_description(content("second", "2")).unwrap();
            let child = db.insert_component(new_component("Disk", "hardware")).unwrap();

            let mut input = new_component("Server", "hardware");
            input.description_ids = vec![second.id, first.id];
            input.child_ids = vec![child.id];
            let parent = db.insert_component(input).unwrap();

            let view = db.find_component_populated(parent.id).unwrap();

            let names: Vec<_> = view.descriptions.iter().map(|d| d.name.as_str()).collect();
            assert_eq!(names, vec!["second", "first"]);
            assert_eq!(view.components.len(), 1);
            assert_eq!(view.components[0].name, "Disk");
        }

        it "skips dangling references" {
            let mut input = new_component("Server", "hardware");
            input.description_ids = vec![Uuid::new_v4()];
            input.child_ids = vec![Uuid::new_v4()];
            let parent = db.insert_component(input).unwrap();

            let view = db.find_component_populated(parent.id).unwrap();

            assert!(view.descriptions.is_empty());
            assert!(view.components.is_empty());
        }

        it "populates every component" {
            db.insert_component(new_component("a", "x")).unwrap();
            db.insert_component(new_component("b", "x")).unwrap();

            assert_eq!(db.find_all_populated().unwrap().len(), 2);
        }
    }

    describe "descriptions" {
        it "inserts and finds a description" {
            let description = db.insert_description(content("serial", "X-1")).unwrap();
            let found = db.find_description(description.id).unwrap();

            assert_eq!(found.name, "serial");
            assert_eq!(found.text, "X-1");
        }

        it "updates content" {
            let description = db.insert_description(content("serial", "X-1")).unwrap();
            let updated = db.update_description(description.id, content("serial", "X-2")).unwrap();

            assert_eq!(updated.text, "X-2");
            assert_eq!(updated.created_at, description.created_at);
            assert_eq!(db.find_description(description.id).unwrap().text, "X-2");
        }

        it "returns the deleted record" {
            let description = db.insert_description(content("serial", "X-1")).unwrap();
            let deleted = db.delete_description(description.id).unwrap();

            assert_eq!(deleted.id, description.id);
            assert!(db.find_description(description.id).unwrap_err().is_not_found());
        }

        it "returns not found for unknown ids" {
            let id = Uuid::new_v4();
            assert!(db.find_description(id).unwrap_err().is_not_found());
            assert!(db.update_description(id, content("a", "b")).unwrap_err().is_not_found());
            assert!(db.delete_description(id).unwrap_err().is_not_found());
        }

        it "lists descriptions in insertion order" {
            db.insert_description(content("one", "1")).unwrap();
            db.insert_description(content("two", "2")).unwrap();

            let names: Vec<_> = db.find_all_descriptions().unwrap()
                .into_iter()
                .map(|d| d.name)
                .collect();
            assert_eq!(names, vec!["one", "two"]);
        }
    }

    describe "history" {
        it "stores a snapshot of the component" {
            let component = db.insert_component(new_component("Server", "hardware")).unwrap();
            let entry = db.insert_history(history_for(&component, HistoryAction::CreateComponent)).unwrap();

            let found = db.find_history(entry.id).unwrap();
            assert_eq!(found.component_id, component.id);
            assert_eq!(found.component_name, "Server");
            assert_eq!(found.component_type, "hardware");
            assert_eq!(found.actor_id, "tester");
            assert_eq!(found.action, HistoryAction::CreateComponent);
        }

        it "round-trips subcomponent and details" {
            let parent = db.insert_component(new_component("Server", "hardware")).unwrap();
            let child = db.insert_component(new_component("Disk", "hardware")).unwrap();

            let mut entry = history_for(&parent, HistoryAction::AssociateSubcomponent);
            entry.subcomponent = Some(SubcomponentSnapshot::from(&child.summary()));
            let entry = db.insert_history(entry).unwrap();

            let found = db.find_history(entry.id).unwrap();
            let subcomponent = found.subcomponent.expect("subcomponent snapshot");
            assert_eq!(subcomponent.id, child.id);
            assert_eq!(subcomponent.name, "Disk");
        }

        it "filters by component in insertion order" {
            let a = db.insert_component(new_component("a", "x")).unwrap();
            let b = db.insert_component(new_component("b", "x")).unwrap();
            db.insert_history(history_for(&a, HistoryAction::CreateComponent)).unwrap();
            db.insert_history(history_for(&b, HistoryAction::CreateComponent)).unwrap();
            db.insert_history(history_for(&a, HistoryAction::EditComponent)).unwrap();

            let actions: Vec<_> = db.find_history_by_component(a.id).unwrap()
                .into_iter()
                .map(|e| e.action)
                .collect();
            assert_eq!(actions, vec![HistoryAction::CreateComponent, HistoryAction::EditComponent]);
            assert_eq!(db.find_all_history().unwrap().len(), 3);
        }

        it "returns an empty list for unknown components" {
            assert!(db.find_history_by_component(Uuid::new_v4()).unwrap().is_empty());
        }

        it "updates and deletes entries" {
            let component = db.insert_component(new_component("Server", "hardware")).unwrap();
            let entry = db.insert_history(history_for(&component, HistoryAction::CreateComponent)).unwrap();

            let updated = db.update_history(entry.id, UpdateHistoryInput {
                actor_id: Some("auditor".to_string()),
                ..Default::default()
            }).unwrap();
            assert_eq!(updated.actor_id, "auditor");
            assert_eq!(updated.action, HistoryAction::CreateComponent);

            db.delete_history(entry.id).unwrap();
            assert!(db.find_history(entry.id).unwrap_err().is_not_found());
            assert!(db.delete_history(entry.id).unwrap_err().is_not_found());
        }
    }

    describe "on-disk databases" {
        it "persists across reopen" {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("catalog.db");

            let id = {
                let disk = Database::open(path.clone()).unwrap();
                disk.migrate().unwrap();
                disk.insert_component(new_component("Server", "hardware")).unwrap().id
            };

            let reopened = Database::open(path).unwrap();
            reopened.migrate().unwrap();
            assert_eq!(reopened.find_component(id).unwrap().name, "Server");
        }
    }
}
