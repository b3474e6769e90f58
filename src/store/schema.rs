/// Applied on every open; each statement is idempotent.
///
/// Status is plain TEXT. Values are validated when rows are read, so adding
/// a status never needs a table rebuild.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tools (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	name TEXT DEFAULT NULL,
	stock INTEGER NOT NULL DEFAULT 0,
	CHECK(stock >= 0)
);

CREATE TABLE IF NOT EXISTS reservations (
	id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
	tool_id INTEGER NOT NULL,
	user_id INTEGER NOT NULL,
	start_date TEXT NOT NULL,
	end_date TEXT NOT NULL,
	quantity INTEGER DEFAULT 1,
	status TEXT NOT NULL DEFAULT 'active',
	previous_status TEXT DEFAULT NULL,
	created_at TEXT NOT NULL,
	CHECK(start_date <= end_date),
	FOREIGN KEY(tool_id) REFERENCES tools(id)
);

CREATE INDEX IF NOT EXISTS idx_reservations_tool ON reservations(tool_id, start_date);
CREATE INDEX IF NOT EXISTS idx_reservations_status_end ON reservations(status, end_date);
"#;
