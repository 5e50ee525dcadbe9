//! SQL schema for the ClientHub SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS organizations (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    slug                TEXT NOT NULL UNIQUE,
    plan                TEXT NOT NULL DEFAULT 'freelance',
    subscription_status TEXT NOT NULL DEFAULT 'trial',
    trial_ends_at       TEXT,
    logo_url            TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clients (
    id              TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(id),
    name            TEXT NOT NULL,
    color           TEXT NOT NULL DEFAULT '#10b981',
    contact_name    TEXT,
    contact_email   TEXT,
    contact_phone   TEXT,
    logo_url        TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Staff carry an organization, client users a client; never both.
CREATE TABLE IF NOT EXISTS profiles (
    id              TEXT PRIMARY KEY,
    email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
    full_name       TEXT,
    role            TEXT NOT NULL,   -- 'admin' | 'team' | 'client'
    organization_id TEXT REFERENCES organizations(id),
    client_id       TEXT REFERENCES clients(id),
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    CHECK ((organization_id IS NULL) != (client_id IS NULL))
);

CREATE TABLE IF NOT EXISTS credentials (
    profile_id    TEXT PRIMARY KEY REFERENCES profiles(id),
    password_hash TEXT               -- argon2 PHC string; NULL for magic-link only
);

-- Only SHA-256 digests of tokens are stored.
CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    profile_id TEXT NOT NULL REFERENCES profiles(id),
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS magic_links (
    token_hash  TEXT PRIMARY KEY,
    profile_id  TEXT NOT NULL REFERENCES profiles(id),
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    consumed_at TEXT
);

-- Requests are never deleted.
CREATE TABLE IF NOT EXISTS requests (
    id              TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(id),
    client_id       TEXT NOT NULL REFERENCES clients(id),
    title           TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description     TEXT,
    type            TEXT NOT NULL DEFAULT 'other',
    status          TEXT NOT NULL DEFAULT 'new',
    priority        TEXT NOT NULL DEFAULT 'medium',
    due_date        TEXT,            -- YYYY-MM-DD
    created_by      TEXT NOT NULL REFERENCES profiles(id),
    assigned_to     TEXT REFERENCES profiles(id),
    version         INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Comments are strictly append-only; `seq` is the conversation order.
CREATE TABLE IF NOT EXISTS comments (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    id          TEXT NOT NULL UNIQUE,
    request_id  TEXT NOT NULL REFERENCES requests(id),
    author_id   TEXT NOT NULL REFERENCES profiles(id),
    content     TEXT NOT NULL CHECK (length(trim(content)) > 0),
    is_internal INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS clients_org_idx      ON clients(organization_id);
CREATE INDEX IF NOT EXISTS profiles_client_idx  ON profiles(client_id);
CREATE INDEX IF NOT EXISTS requests_org_idx     ON requests(organization_id, created_at);
CREATE INDEX IF NOT EXISTS requests_client_idx  ON requests(client_id);
CREATE INDEX IF NOT EXISTS requests_due_idx     ON requests(organization_id, due_date);
CREATE INDEX IF NOT EXISTS comments_request_idx ON comments(request_id, seq);
CREATE INDEX IF NOT EXISTS sessions_profile_idx ON sessions(profile_id);

PRAGMA user_version = 1;
";
