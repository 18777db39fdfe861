use flyto_index::indexer::extract::{FileContext, LanguageExtractor, ParsedFile};
use flyto_index::indexer::go::GoExtractor;

fn extract(rel_path: &str, source: &str) -> ParsedFile {
    let mut extractor = GoExtractor::new().unwrap();
    let ctx = FileContext {
        project: "svc",
        rel_path,
    };
    extractor.extract(&ctx, source).unwrap()
}

const REPO: &str = r#"package users

import (
	"fmt"
	store "example.com/svc/storage"
)

const MaxPageSize = 100

// UserRepo loads and stores users.
type UserRepo struct {
	db *store.DB
}

type Loader interface {
	Load(id string) error
}

// GetUser returns one user by id.
func (r *UserRepo) GetUser(id string) (string, error) {
	return r.db.Fetch(id)
}

func NewRepo(db *store.DB) *UserRepo {
	return &UserRepo{db: db}
}

func helper() int {
	return MaxPageSize
}
"#;

#[test]
fn extracts_structs_interfaces_methods_and_consts() {
    let parsed = extract("users/repo.go", REPO);
    let names: Vec<(&str, &str)> = parsed
        .symbols
        .iter()
        .map(|s| (s.kind.as_str(), s.id.name.as_str()))
        .collect();

    assert!(names.contains(&("module", "users")));
    assert!(names.contains(&("struct", "UserRepo")));
    assert!(names.contains(&("interface", "Loader")));
    assert!(names.contains(&("method", "UserRepo.GetUser")));
    assert!(names.contains(&("function", "NewRepo")));
    assert!(names.contains(&("constant", "MaxPageSize")));
}

#[test]
fn exported_follows_capitalization() {
    let parsed = extract("users/repo.go", REPO);
    let new_repo = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "NewRepo")
        .unwrap();
    assert!(new_repo.exports);
    let helper = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "helper")
        .unwrap();
    assert!(!helper.exports);
}

#[test]
fn doc_comments_attach_to_declarations() {
    let parsed = extract("users/repo.go", REPO);
    let get_user = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "UserRepo.GetUser")
        .unwrap();
    assert_eq!(get_user.doc.as_deref(), Some("GetUser returns one user by id."));
    assert_eq!(get_user.signature.as_deref(), Some("(id string) (string, error)"));
}

#[test]
fn imports_capture_paths_and_aliases() {
    let parsed = extract("users/repo.go", REPO);
    let fmt_import = parsed.imports.iter().find(|i| i.module == "fmt").unwrap();
    assert_eq!(fmt_import.names, vec!["fmt"]);
    let store_import = parsed
        .imports
        .iter()
        .find(|i| i.module == "example.com/svc/storage")
        .unwrap();
    assert_eq!(store_import.alias.as_deref(), Some("store"));
}

#[test]
fn function_bodies_produce_refs() {
    let parsed = extract("users/repo.go", REPO);
    let helper = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "helper")
        .unwrap();
    assert!(helper.refs_out.contains(&"MaxPageSize".to_string()));
    let new_repo = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "NewRepo")
        .unwrap();
    assert!(new_repo.refs_out.contains(&"UserRepo".to_string()));
}
