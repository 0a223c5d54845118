pub(crate) const INSERT_QUEUE_ENTRY: &str = r#"
    INSERT INTO offline_attendance_queue
        (queue_key, student_id, class_date, status, notes, marked_by, queued_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

pub(crate) const SELECT_QUEUE_ENTRIES: &str = r#"
    SELECT seq, student_id, class_date, status, notes, marked_by, queued_at
    FROM offline_attendance_queue
    WHERE queue_key = ?
    ORDER BY seq ASC
"#;

pub(crate) const DELETE_QUEUE_ENTRY: &str = r#"
    DELETE FROM offline_attendance_queue
    WHERE queue_key = ? AND seq = ?
"#;

pub(crate) const COUNT_QUEUE_ENTRIES: &str = r#"
    SELECT COUNT(*) FROM offline_attendance_queue
    WHERE queue_key = ?
"#;
