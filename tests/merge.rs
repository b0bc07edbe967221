use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use pubtator_tools::error::PubtatorError;
use pubtator_tools::merge::{MergeOptions, Merger};
use pubtator_tools::webannotation::{parse_annotations, read_annotations};

fn span(id: &str, start: usize, end: usize, text: &str) -> String {
    format!(
        r#"{{"type":"Span","id":"{id}","target":"PMID:1/text#char={start},{end}","body":{{"type":"Gene"}},"text":"{text}"}}"#
    )
}

fn write(path: &Path, spans: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("[{}]", spans.join(","))).unwrap();
}

fn trees(root: &Path) {
    write(&root.join("a/1.jsonld"), &[span("PMID:1/ann/0", 0, 4, "SOD1")]);
    write(&root.join("b/1.jsonld"), &[span("PMID:1/ann/0", 10, 14, "TP53")]);
    write(&root.join("a/2.jsonld"), &[span("PMID:2/ann/0", 0, 4, "SOD1")]);
    write(&root.join("a/sub/3.jsonld"), &[span("PMID:3/ann/0", 0, 4, "SOD1")]);
    write(&root.join("b/sub/3.jsonld"), &[span("PMID:3/ann/0", 5, 9, "SOD2")]);
    fs::write(root.join("a/1.txt"), "SOD1").unwrap();
    fs::write(root.join("b/1.txt"), "SOD1").unwrap();
}

fn merge(root: &Path, options: MergeOptions) -> usize {
    let mut merger = Merger::new(options, Vec::new());
    merger
        .merge(&[root.join("a"), root.join("b")])
        .unwrap();
    merger.merged()
}

#[test]
fn intersection_of_directories() {
    let temp = tempfile::tempdir().unwrap();
    trees(temp.path());
    let out = temp.path().join("out");
    let merged = merge(
        temp.path(),
        MergeOptions {
            output: Some(out.clone()),
            ..MergeOptions::default()
        },
    );
    assert_eq!(merged, 1);
    assert!(!out.join("2.jsonld").exists());
    assert!(!out.join("sub").exists());

    let annotations = read_annotations(&out.join("1.jsonld")).unwrap();
    let ids = annotations.iter().map(|a| a.id()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["PMID:1/ann/0", "PMID:1/ann/1"]);
}

#[test]
fn union_and_recursion() {
    let temp = tempfile::tempdir().unwrap();
    trees(temp.path());
    let out = temp.path().join("out");
    let merged = merge(
        temp.path(),
        MergeOptions {
            output: Some(out.clone()),
            recurse: true,
            union: true,
            ..MergeOptions::default()
        },
    );
    assert_eq!(merged, 3);
    assert_eq!(read_annotations(&out.join("2.jsonld")).unwrap().len(), 1);
    let nested = read_annotations(&out.join("sub/3.jsonld")).unwrap();
    assert_eq!(nested.len(), 2);
    assert_eq!(nested[1].id(), "PMID:3/ann/1");
}

#[test]
fn files_merge_to_stdout() {
    let temp = tempfile::tempdir().unwrap();
    trees(temp.path());
    let mut merger = Merger::new(MergeOptions::default(), Vec::new());
    merger
        .merge(&[temp.path().join("a/1.jsonld"), temp.path().join("b/1.jsonld")])
        .unwrap();
    let printed = String::from_utf8(merger.into_inner()).unwrap();
    let annotations = parse_annotations(&printed, "stdout").unwrap();
    assert_eq!(annotations.len(), 2);
}

#[test]
fn files_and_directories_do_not_mix() {
    let temp = tempfile::tempdir().unwrap();
    trees(temp.path());
    let mut merger = Merger::new(MergeOptions::default(), Vec::new());
    assert_matches!(
        merger.merge(&[temp.path().join("a/1.jsonld"), temp.path().join("b")]),
        Err(PubtatorError::Merge(_))
    );
    assert_matches!(
        merger.merge(&[temp.path().join("a/1.jsonld"), temp.path().join("c.jsonld")]),
        Err(PubtatorError::Filesystem(_))
    );
}
