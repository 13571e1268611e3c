//! End-to-end analysis over real file trees.
//!
//! These tests write small Python projects to a temporary directory and
//! drive the analyzer the way the CLI does: load a file, resolve names,
//! search occurrences, outline modules.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use sift_python::{Analyzer, NameKind, Project, ProjectConfig};

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (path, contents) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(full, contents).expect("write");
    }
    dir
}

fn analyzer_at(root: &Path) -> Analyzer {
    Analyzer::new(Project::new(ProjectConfig::rooted_at(root)))
}

fn position_of(source: &str, needle: &str, skip: usize) -> (u32, u32) {
    let offset = source
        .match_indices(needle)
        .nth(skip)
        .map(|(at, _)| at)
        .expect("needle in source");
    let line = source[..offset].bytes().filter(|&b| b == b'\n').count() as u32 + 1;
    let line_start = source[..offset].rfind('\n').map(|at| at + 1).unwrap_or(0);
    (line, (offset - line_start) as u32 + 1)
}

#[test]
fn resolves_across_package_boundaries() {
    let app = "\
from shapes.circle import Circle

c = Circle()
c.area()
";
    let dir = project(&[
        ("shapes/__init__.py", ""),
        (
            "shapes/circle.py",
            "class Circle:\n    def area(self):\n        return 3.14\n",
        ),
        ("app.py", app),
    ]);
    let mut analyzer = analyzer_at(dir.path());
    let module = analyzer.load_path(&dir.path().join("app.py")).unwrap();

    let (line, col) = position_of(app, "area", 0);
    let resolved = analyzer.resolve_position(module, line, col).unwrap();
    assert_eq!(resolved.kind, NameKind::Function);
    assert_eq!(resolved.module.as_deref(), Some("shapes.circle"));
    assert_eq!(resolved.line, Some(2));
}

#[test]
fn relative_imports_resolve_inside_packages() {
    let consumer = "\
from .models import Record

r = Record()
";
    let dir = project(&[
        ("pkg/__init__.py", ""),
        ("pkg/models.py", "class Record:\n    pass\n"),
        ("pkg/consumer.py", consumer),
    ]);
    let mut analyzer = analyzer_at(dir.path());
    let module = analyzer
        .load_path(&dir.path().join("pkg/consumer.py"))
        .unwrap();

    let (line, col) = position_of(consumer, "Record", 1);
    let resolved = analyzer.resolve_position(module, line, col).unwrap();
    assert_eq!(resolved.module.as_deref(), Some("pkg.models"));
    assert_eq!(resolved.kind, NameKind::Class);
}

#[test]
fn occurrences_span_the_whole_project() {
    let lib = "def helper():\n    pass\n";
    let first = "from lib import helper\nhelper()\n";
    let second = "import lib\nlib.helper()\n";
    let dir = project(&[("lib.py", lib), ("first.py", first), ("second.py", second)]);
    let mut analyzer = analyzer_at(dir.path());
    let module = analyzer.load_path(&dir.path().join("lib.py")).unwrap();

    let offset = lib.find("helper").unwrap();
    let found = analyzer
        .find_occurrences_in_project(module, offset, false, &mut |_| true)
        .unwrap();
    let per_module: Vec<(&str, u32)> = found
        .iter()
        .map(|o| (o.module.as_str(), o.line))
        .collect();
    assert_eq!(
        per_module,
        [
            ("first", 1),
            ("first", 2),
            ("lib", 1),
            ("second", 2),
        ]
    );
}

#[test]
fn call_samples_cross_module_boundaries() {
    let lib = "\
def process(payload):
    kept = payload
    return kept
";
    let app = "\
import lib

result = lib.process('data')
";
    let dir = project(&[("lib.py", lib), ("app.py", app)]);
    let mut analyzer = analyzer_at(dir.path());
    let app_module = analyzer.load_path(&dir.path().join("app.py")).unwrap();
    analyzer.analyze_module_calls(app_module);

    let (line, col) = position_of(app, "result", 0);
    let resolved = analyzer.resolve_position(app_module, line, col).unwrap();
    assert_eq!(resolved.object, "str");
}

#[test]
fn editing_a_dependency_updates_conclusions() {
    let app = "from lib import thing\ncopy = thing\n";
    let dir = project(&[("lib.py", "thing = []\n"), ("app.py", app)]);
    let mut analyzer = analyzer_at(dir.path());
    let app_module = analyzer.load_path(&dir.path().join("app.py")).unwrap();

    let (line, col) = position_of(app, "copy", 0);
    let before = analyzer.resolve_position(app_module, line, col).unwrap();
    assert_eq!(before.object, "list");

    let lib_module = analyzer.load_module("lib").unwrap();
    analyzer.update_module(lib_module, "thing = 'text'\n");
    let after = analyzer.resolve_position(app_module, line, col).unwrap();
    assert_eq!(after.object, "str");
}

#[test]
fn outline_reflects_nesting() {
    let source = "\
class Shape:
    def area(self):
        pass

    def perimeter(self):
        pass

def standalone():
    pass
";
    let dir = project(&[("shapes.py", source)]);
    let mut analyzer = analyzer_at(dir.path());
    let module = analyzer.load_path(&dir.path().join("shapes.py")).unwrap();

    let outline = analyzer.module_outline(module);
    assert_eq!(outline.len(), 2);
    assert_eq!(outline[0].name, "Shape");
    assert_eq!(outline[0].kind, "class");
    let methods: Vec<&str> = outline[0].children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(methods, ["area", "perimeter"]);
    assert_eq!(outline[1].name, "standalone");
    assert_eq!(outline[1].kind, "function");
}

#[test]
fn broken_files_do_not_poison_the_rest() {
    let good = "value = 1\nprint(value)\n";
    let dir = project(&[("good.py", good), ("broken.py", "def broken(:\n")]);
    let mut analyzer = analyzer_at(dir.path());
    let module = analyzer.load_path(&dir.path().join("good.py")).unwrap();

    let offset = good.find("value").unwrap();
    let found = analyzer
        .find_occurrences_in_project(module, offset, false, &mut |_| true)
        .unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|o| o.module == "good"));
}
