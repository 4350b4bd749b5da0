mod test_support;

use serde_json::json;
use std::fs;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir, write_file};

fn profile_count(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    id: &str,
) -> u64 {
    let described = request_ok(
        stdin,
        reader,
        id,
        "models.describe",
        json!({ "model": "StudentProfile" }),
    );
    described["count"].as_u64().expect("count")
}

#[test]
fn preview_reports_row_errors_with_source_lines() {
    let workspace = temp_dir("recordsd-exchange-preview");
    let profiles = workspace.join("in").join("profiles.csv");
    let history = workspace.join("in").join("history.csv");
    write_file(
        &profiles,
        "student_id,first_name,last_name,date_of_birth,contact_number\n\
         S1,Ada,Lee,2010-01-02,5550001\n",
    );
    write_file(
        &history,
        "student,academic_year,form_class,is_current,notes\n\
         S1,2024,2A,true,kept\n\
         S9,2024,2B,false,unknown student\n\
         S1,-3,1A,false,negative year\n\
         S1,2023,1A,maybe,bad bool\n",
    );

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "exchange.applyModelCsv",
        json!({ "model": "StudentProfile", "inPath": profiles.to_string_lossy() }),
    );

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "exchange.previewModelCsv",
        json!({ "model": "StudentClassHistory", "inPath": history.to_string_lossy() }),
    );
    assert_eq!(preview["rowsTotal"].as_u64(), Some(4));
    assert_eq!(preview["rowsValid"].as_u64(), Some(1));
    assert_eq!(preview["rowsRejected"].as_u64(), Some(3));
    assert_eq!(preview["existing"].as_u64(), Some(0));
    assert_eq!(preview["needsPolicy"].as_bool(), Some(false));
    assert_eq!(preview["ignoredColumns"], json!(["notes"]));
    assert_eq!(preview["previewRows"][0]["line"].as_u64(), Some(2));

    let errors = preview["rowErrors"].as_array().expect("rowErrors");
    let lines: Vec<u64> = errors.iter().filter_map(|e| e["line"].as_u64()).collect();
    assert_eq!(lines, vec![3, 4, 5]);
    assert_eq!(errors[0]["code"].as_str(), Some("missing_reference"));
    assert_eq!(errors[0]["field"].as_str(), Some("student"));
    assert!(errors[0]["message"]
        .as_str()
        .unwrap_or("")
        .contains("'S9'"));
    assert_eq!(errors[1]["field"].as_str(), Some("academic_year"));
    assert_eq!(errors[2]["field"].as_str(), Some("is_current"));

    // Preview is read-only; applying keeps the valid row and reports the rest.
    let applied = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "exchange.applyModelCsv",
        json!({ "model": "StudentClassHistory", "inPath": history.to_string_lossy() }),
    );
    assert_eq!(applied["imported"].as_u64(), Some(1));
    assert_eq!(applied["rowsRejected"].as_u64(), Some(3));

    let _ = child.kill();
    let _ = fs::remove_dir_all(workspace);
}

#[test]
fn missing_columns_reject_the_whole_file_without_mutation() {
    let workspace = temp_dir("recordsd-exchange-mismatch");
    let good = workspace.join("good.csv");
    let bad = workspace.join("bad.csv");
    write_file(
        &good,
        "student_id,first_name,last_name,date_of_birth,contact_number\n\
         S1,Ada,Lee,2010-01-02,5550001\n",
    );
    write_file(&bad, "student_id,first_name\nS2,Ben\n");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "exchange.applyModelCsv",
        json!({ "model": "StudentProfile", "inPath": good.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "exchange.applyModelCsv",
        json!({
            "model": "StudentProfile",
            "inPath": bad.to_string_lossy(),
            "policy": "replace"
        }),
    );
    assert_eq!(error_code(&resp), Some("schema_mismatch"));
    assert_eq!(
        resp["error"]["details"]["missing"],
        json!(["last_name", "date_of_birth", "contact_number"])
    );
    assert_eq!(profile_count(&mut stdin, &mut reader, "4"), 1);

    let missing = request(
        &mut stdin,
        &mut reader,
        "5",
        "exchange.previewModelCsv",
        json!({
            "model": "StudentProfile",
            "inPath": workspace.join("nope.csv").to_string_lossy()
        }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    let _ = child.kill();
    let _ = fs::remove_dir_all(workspace);
}

#[test]
fn existing_data_requires_a_policy_and_cancel_leaves_it_alone() {
    let workspace = temp_dir("recordsd-exchange-policy");
    let first = workspace.join("first.csv");
    let second = workspace.join("second.csv");
    let backup = workspace.join("before-replace.zip");
    write_file(
        &first,
        "student_id,first_name,last_name,date_of_birth,contact_number\n\
         S1,Ada,Lee,2010-01-02,5550001\n\
         S2,Ben,Chan,2009-11-30,5550002\n",
    );
    write_file(
        &second,
        "student_id,first_name,last_name,date_of_birth,contact_number\n\
         S3,Cai,Wong,2011-05-06,5550003\n",
    );

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "exchange.applyModelCsv",
        json!({ "model": "StudentProfile", "inPath": first.to_string_lossy() }),
    );

    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "exchange.previewModelCsv",
        json!({ "model": "StudentProfile", "inPath": second.to_string_lossy() }),
    );
    assert_eq!(preview["existing"].as_u64(), Some(2));
    assert_eq!(preview["needsPolicy"].as_bool(), Some(true));

    let no_policy = request(
        &mut stdin,
        &mut reader,
        "4",
        "exchange.applyModelCsv",
        json!({ "model": "StudentProfile", "inPath": second.to_string_lossy() }),
    );
    assert_eq!(error_code(&no_policy), Some("policy_required"));
    assert_eq!(no_policy["error"]["details"]["existing"].as_u64(), Some(2));

    let bad_policy = request(
        &mut stdin,
        &mut reader,
        "5",
        "exchange.applyModelCsv",
        json!({
            "model": "StudentProfile",
            "inPath": second.to_string_lossy(),
            "policy": "overwrite"
        }),
    );
    assert_eq!(error_code(&bad_policy), Some("bad_params"));

    let cancelled = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "exchange.applyModelCsv",
        json!({
            "model": "StudentProfile",
            "inPath": second.to_string_lossy(),
            "policy": "c"
        }),
    );
    assert_eq!(cancelled["imported"].as_u64(), Some(0));
    assert_eq!(cancelled["deleted"].as_u64(), Some(0));
    assert_eq!(profile_count(&mut stdin, &mut reader, "7"), 2);

    let merged = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "exchange.applyModelCsv",
        json!({
            "model": "StudentProfile",
            "inPath": second.to_string_lossy(),
            "policy": "merge"
        }),
    );
    assert_eq!(merged["imported"].as_u64(), Some(1));
    assert_eq!(profile_count(&mut stdin, &mut reader, "9"), 3);

    // Merging the same rows again collides with the unique key and rolls back.
    let conflict = request(
        &mut stdin,
        &mut reader,
        "10",
        "exchange.applyModelCsv",
        json!({
            "model": "StudentProfile",
            "inPath": first.to_string_lossy(),
            "policy": "merge"
        }),
    );
    assert_eq!(error_code(&conflict), Some("reconciliation_conflict"));
    assert_eq!(profile_count(&mut stdin, &mut reader, "11"), 3);

    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "exchange.applyModelCsv",
        json!({
            "model": "StudentProfile",
            "inPath": second.to_string_lossy(),
            "policy": "replace",
            "backupPath": backup.to_string_lossy()
        }),
    );
    assert_eq!(replaced["deleted"].as_u64(), Some(3));
    assert_eq!(replaced["imported"].as_u64(), Some(1));
    assert!(replaced["backup"]["dbSha256"].is_string());
    assert!(backup.is_file());
    assert_eq!(profile_count(&mut stdin, &mut reader, "13"), 1);

    let _ = child.kill();
    let _ = fs::remove_dir_all(workspace);
}
