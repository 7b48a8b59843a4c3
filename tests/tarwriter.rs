//! Integration coverage for `epicbox::tarwriter` through the public
//! API, exercising the JSON-to-archive pipeline a caller actually
//! drives (untrusted `files` payload in, tar bytes out).

use epicbox::tarwriter::{build_tar, files_from_json};

#[test]
fn untrusted_json_payload_becomes_a_readable_archive() {
    let value = serde_json::json!([
        {"name": "run.sh", "content": "echo hi\n"},
        {"name": "src/main.py", "content": "print('hi')\n"},
        {"content": "skipped, no name"},
    ]);

    let files = files_from_json(&value);
    assert_eq!(files.len(), 2);

    let tar_bytes = build_tar(&files).expect("tar assembly should not fail");

    let mut archive = tar::Archive::new(tar_bytes.as_slice());
    let mut seen = Vec::new();
    for entry in archive.entries().unwrap() {
        let entry = entry.unwrap();
        seen.push(entry.path().unwrap().to_string_lossy().to_string());
    }
    seen.sort();
    assert_eq!(seen, vec!["run.sh".to_string(), "src/main.py".to_string()]);
}

#[test]
fn non_array_json_payload_yields_no_files() {
    let value = serde_json::json!({"not": "an array"});
    assert!(files_from_json(&value).is_empty());
}
