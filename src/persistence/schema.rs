pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS agent_state (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    expires_at INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_agent_state_expires ON agent_state(expires_at);
";
