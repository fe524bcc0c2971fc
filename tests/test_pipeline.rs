use std::fs;
use std::path::Path;

use metadelta::pipeline::manifest_path;
use metadelta::{
    run_delta, run_package, run_package_from, ChangeSource, DeltaOptions, LocalFs, TypeConfig,
    VcsError,
};
use tempfile::tempdir;

/// Change source returning a canned report.
struct CannedReport(Result<&'static str, ()>);

impl ChangeSource for CannedReport {
    fn change_report(&self, reference: &str) -> Result<String, VcsError> {
        match self.0 {
            Ok(report) => Ok(report.to_string()),
            Err(()) => Err(VcsError::EmptyReport(reference.to_string())),
        }
    }
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn setup_snapshot(root: &Path) {
    write(root, "classes/Bar.cls", "public class Bar {}");
    write(root, "classes/Bar.cls-meta.xml", "<ApexClass/>");
    write(root, "classes/Unused.cls", "public class Unused {}");
    write(root, "classes/Unused.cls-meta.xml", "<ApexClass/>");
    write(
        root,
        "objects/Foo__c.object",
        "<CustomObject><fields><fullName>Size__c</fullName></fields></CustomObject>",
    );
    write(root, "aura/Widget/Widget.cmp", "<aura:component/>");
    write(root, "aura/Widget/Widget.cmp-meta.xml", "<AuraDefinitionBundle/>");
    write(root, "aura/Widget/WidgetController.js", "({})");
    write(root, "aura/Widget/Widget.css", ".THIS {}");
    write(root, "aura/Other/Other.cmp", "<aura:component/>");
    write(root, "pages/Home.page", "<apex:page/>");
}

fn options(root: &Path) -> DeltaOptions {
    DeltaOptions {
        src_root: root.to_path_buf(),
        reference: "HEAD~1".to_string(),
        dry_run: false,
    }
}

#[test]
fn test_delta_then_package() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    setup_snapshot(root);

    let source = CannedReport(Ok(
        "A\tobjects/Foo__c.object\nM\tclasses/Bar.cls\nM\taura/Widget/WidgetController.js\nD\tpages/Home.page\n",
    ));
    let config = TypeConfig::builtin().unwrap();

    let report = run_delta(&options(root), &config, &source, &LocalFs).unwrap();
    assert_eq!(report.changed, 3);
    assert_eq!(report.listed, 11);

    assert!(root.join("classes/Bar.cls").exists());
    assert!(root.join("classes/Bar.cls-meta.xml").exists(), "sidecar kept");
    assert!(root.join("objects/Foo__c.object").exists());
    assert!(root.join("aura/Widget/Widget.css").exists(), "changed bundle kept whole");
    assert!(root.join("aura/Widget/Widget.cmp").exists());

    assert!(!root.join("classes/Unused.cls").exists());
    assert!(!root.join("aura/Other").exists(), "unchanged bundle removed and pruned");
    assert!(!root.join("pages").exists(), "deleted paths are not kept");
    assert_eq!(report.removal.removed.len(), 4);

    let manifest = run_package(root, &config, &LocalFs, false).unwrap();
    let written = fs::read_to_string(manifest_path(root)).unwrap();
    assert!(written.contains("<name>ApexClass</name>"));
    assert!(written.contains("<members>Foo__c.Size__c</members>"));

    assert_eq!(manifest.category("ApexClass").unwrap().members(), ["Bar"]);
    assert_eq!(manifest.category("AuraDefinitionBundle").unwrap().members(), ["*"]);
    assert_eq!(manifest.category("CustomObject").unwrap().members(), ["Foo__c"]);
    assert_eq!(
        manifest.category("CustomField").unwrap().members(),
        ["Foo__c.Size__c"]
    );
}

#[test]
fn test_package_run_twice_ignores_previous_manifest() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "classes/A.cls", "class A {}");

    let config = TypeConfig::builtin().unwrap();
    let first = run_package(root, &config, &LocalFs, false).unwrap();
    let second = run_package(root, &config, &LocalFs, false).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_package_dry_run_writes_nothing() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "classes/A.cls", "class A {}");

    let config = TypeConfig::builtin().unwrap();
    let manifest = run_package(root, &config, &LocalFs, true).unwrap();
    assert_eq!(manifest.member_count(), 1);
    assert!(!manifest_path(root).exists());
}

#[test]
fn test_delta_dry_run_keeps_files() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    setup_snapshot(root);

    let source = CannedReport(Ok("M\tclasses/Bar.cls\n"));
    let mut options = options(root);
    options.dry_run = true;

    let report = run_delta(&options, &TypeConfig::builtin().unwrap(), &source, &LocalFs).unwrap();
    assert!(report.removal.dry_run);
    assert_eq!(report.removal.removed.len(), 9);
    assert!(root.join("classes/Unused.cls").exists());
    assert!(root.join("aura/Other/Other.cmp").exists());
}

#[test]
fn test_dry_run_manifest_lists_only_survivors() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    setup_snapshot(root);

    let source = CannedReport(Ok("M\tclasses/Bar.cls\n"));
    let mut options = options(root);
    options.dry_run = true;
    let config = TypeConfig::builtin().unwrap();

    let report = run_delta(&options, &config, &source, &LocalFs).unwrap();
    assert_eq!(report.remaining.len(), 2);
    assert!(root.join("classes/Unused.cls").exists(), "nothing deleted");

    let manifest = run_package_from(root, report.remaining, &config, &LocalFs, true).unwrap();
    assert_eq!(manifest.category("ApexClass").unwrap().members(), ["Bar"]);
    assert!(manifest.category("CustomObject").is_none());
    assert!(manifest.category("AuraDefinitionBundle").is_none());
    assert!(!manifest_path(root).exists());
}

#[test]
fn test_change_source_failure_aborts_before_pruning() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    setup_snapshot(root);

    let source = CannedReport(Err(()));
    let err = run_delta(&options(root), &TypeConfig::builtin().unwrap(), &source, &LocalFs)
        .unwrap_err();

    assert!(format!("{err:#}").contains("no output"));
    assert!(root.join("classes/Unused.cls").exists(), "nothing removed");
}

#[test]
fn test_missing_reference_is_rejected() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    setup_snapshot(root);

    let mut options = options(root);
    options.reference = "  ".to_string();
    let source = CannedReport(Ok("M\tclasses/Bar.cls\n"));

    let err = run_delta(&options, &TypeConfig::builtin().unwrap(), &source, &LocalFs).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VcsError>(),
        Some(VcsError::MissingReference)
    ));
    assert!(root.join("classes/Unused.cls").exists());
}

#[test]
fn test_missing_source_directory() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    let config = TypeConfig::builtin().unwrap();

    assert!(run_package(&missing, &config, &LocalFs, false).is_err());

    let mut options = options(&missing);
    options.src_root = missing.clone();
    let source = CannedReport(Ok("M\tclasses/Bar.cls\n"));
    assert!(run_delta(&options, &config, &source, &LocalFs).is_err());
}
