mod test_support;

use serde_json::json;
use test_support::{error_code, open_school, request, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn fee_type_lifecycle_with_picker_dates_and_class_links() {
    let workspace = temp_dir("feeledger-fee-types");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_school(&mut stdin, &mut reader, &workspace, "Greenfield");

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "name": "  Grade 1 " }),
    );
    let class_id = str_field(&class, "classId");
    assert_eq!(class.get("name").and_then(|v| v.as_str()), Some("Grade 1"));

    let dup = request(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "grade 1" }),
    );
    assert_eq!(error_code(&dup), Some("conflict"));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "feeTypes.create",
        json!({
            "name": "Annual Day",
            "description": "Event levy",
            "defaultAmount": "250",
            "applicableFrom": { "day": 1, "month": 6, "year": 2024 },
            "classIds": [class_id, "missing-class"]
        }),
    );
    let fee_type_id = str_field(&created, "feeTypeId");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "feeTypes.list",
        json!({ "today": "2024-06-01" }),
    );
    let fee = &listed["feeTypes"][0];
    assert_eq!(fee["id"].as_str(), Some(fee_type_id.as_str()));
    assert_eq!(fee["applicableFrom"].as_str(), Some("2024-07-01"));
    assert_eq!(fee["defaultAmount"].as_f64(), Some(250.0));
    assert_eq!(fee["isActive"].as_bool(), Some(false));
    let classes = fee["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 1, "unknown class ids are not linked");
    assert_eq!(classes[0]["name"].as_str(), Some("Grade 1"));

    let bad_day = request(
        &mut stdin,
        &mut reader,
        "5",
        "feeTypes.create",
        json!({
            "name": "Bad",
            "applicableFrom": { "day": 31, "month": 1, "year": 2024 }
        }),
    );
    assert_eq!(error_code(&bad_day), Some("bad_params"));

    let bad_amount = request(
        &mut stdin,
        &mut reader,
        "6",
        "feeTypes.create",
        json!({ "name": "Bad", "defaultAmount": -5 }),
    );
    assert_eq!(error_code(&bad_amount), Some("bad_params"));

    let no_name = request(
        &mut stdin,
        &mut reader,
        "7",
        "feeTypes.create",
        json!({ "name": "   " }),
    );
    assert_eq!(error_code(&no_name), Some("bad_params"));

    let unset_year = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "feeTypes.create",
        json!({
            "name": "Library",
            "applicableFrom": { "day": 1, "month": 0, "year": 1900 }
        }),
    );
    let library_id = str_field(&unset_year, "feeTypeId");

    // Clearing the start date keeps the amount and links.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "feeTypes.update",
        json!({ "feeTypeId": fee_type_id, "applicableFrom": null }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "feeTypes.list",
        json!({ "today": "2024-06-01" }),
    );
    let fees = listed["feeTypes"].as_array().expect("feeTypes");
    assert_eq!(fees.len(), 2);
    let annual = &fees[0];
    assert_eq!(annual["name"].as_str(), Some("Annual Day"));
    assert!(annual["applicableFrom"].is_null());
    assert_eq!(annual["defaultAmount"].as_f64(), Some(250.0));
    assert_eq!(annual["isActive"].as_bool(), Some(true));
    assert_eq!(annual["classes"].as_array().map(|c| c.len()), Some(1));
    let library = &fees[1];
    assert_eq!(library["id"].as_str(), Some(library_id.as_str()));
    assert!(library["applicableFrom"].is_null());

    let inverted = request(
        &mut stdin,
        &mut reader,
        "11",
        "feeTypes.update",
        json!({
            "feeTypeId": fee_type_id,
            "applicableFrom": "2024-05-01",
            "applicableUntil": "2024-04-01"
        }),
    );
    assert_eq!(error_code(&inverted), Some("bad_params"));

    let copy = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "feeTypes.duplicate",
        json!({ "feeTypeId": fee_type_id }),
    );
    assert_eq!(copy.get("name").and_then(|v| v.as_str()), Some("Copy of Annual Day"));
    let listed = request_ok(&mut stdin, &mut reader, "13", "feeTypes.list", json!({}));
    let copied = listed["feeTypes"]
        .as_array()
        .expect("feeTypes")
        .iter()
        .find(|f| f["name"].as_str() == Some("Copy of Annual Day"))
        .cloned()
        .expect("copy listed");
    assert_eq!(copied["defaultAmount"].as_f64(), Some(250.0));
    assert_eq!(copied["description"].as_str(), Some("Event levy"));
    assert_eq!(copied["classes"][0]["id"].as_str(), Some(class_id.as_str()));

    let mismatch = request(
        &mut stdin,
        &mut reader,
        "14",
        "feeTypes.delete",
        json!({ "feeTypeId": fee_type_id, "confirmName": "annual day" }),
    );
    assert_eq!(error_code(&mismatch), Some("confirm_mismatch"));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "feeTypes.delete",
        json!({ "feeTypeId": fee_type_id, "confirmName": "Annual Day" }),
    );
    assert_eq!(deleted["detachedAssignments"].as_u64(), Some(0));
    let missing = request(
        &mut stdin,
        &mut reader,
        "16",
        "feeTypes.update",
        json!({ "feeTypeId": fee_type_id, "name": "Again" }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    let classes = request_ok(&mut stdin, &mut reader, "17", "classes.list", json!({}));
    assert_eq!(classes["classes"][0]["feeTypeCount"].as_i64(), Some(1));
}

#[test]
fn class_delete_refuses_while_students_are_enrolled() {
    let workspace = temp_dir("feeledger-class-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = open_school(&mut stdin, &mut reader, &workspace, "Riverside");

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "name": "Grade 5" }),
    );
    let class_id = str_field(&class, "classId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "feeTypes.create",
        json!({ "name": "Tuition", "defaultAmount": 1000, "classIds": [class_id] }),
    );
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "name": "Maya", "classId": class_id }),
    );
    let student_id = str_field(&student, "studentId");

    let refused = request(
        &mut stdin,
        &mut reader,
        "4",
        "classes.delete",
        json!({ "classId": class_id }),
    );
    assert_eq!(error_code(&refused), Some("conflict"));
    assert_eq!(refused.pointer("/error/details/studentCount").and_then(|v| v.as_i64()), Some(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "classes.delete",
        json!({ "classId": class_id }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "7", "feeTypes.list", json!({}));
    assert_eq!(
        listed["feeTypes"][0]["classes"].as_array().map(|c| c.len()),
        Some(0)
    );
    let classes = request_ok(&mut stdin, &mut reader, "8", "classes.list", json!({}));
    assert_eq!(classes["classes"].as_array().map(|c| c.len()), Some(0));
}
