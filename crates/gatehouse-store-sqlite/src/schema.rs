//! SQL schema for the Gatehouse SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS persons (
    person_id         TEXT PRIMARY KEY,
    username          TEXT NOT NULL UNIQUE,
    email             TEXT UNIQUE COLLATE NOCASE,
    password_hash     TEXT NOT NULL,   -- argon2 PHC string
    first_name        TEXT NOT NULL DEFAULT '',
    last_name         TEXT NOT NULL DEFAULT '',
    role              TEXT NOT NULL CHECK (role IN ('admin', 'guard', 'trainee')),
    status            TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'blocked')),
    home_site         TEXT,
    training_program  TEXT,
    document          TEXT UNIQUE,     -- badge / QR value
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS equipment (
    equipment_id      TEXT PRIMARY KEY,
    owner_id          TEXT NOT NULL REFERENCES persons(person_id),
    serial            TEXT NOT NULL UNIQUE,
    brand             TEXT NOT NULL DEFAULT '',
    model             TEXT NOT NULL DEFAULT '',
    state             TEXT NOT NULL DEFAULT 'pending'
                      CHECK (state IN ('pending', 'approved', 'rejected')),
    rejection_reason  TEXT,
    reviewed_by       TEXT REFERENCES persons(person_id),
    reviewed_at       TEXT,
    created_at        TEXT NOT NULL,
    CHECK (state <> 'rejected' OR rejection_reason IS NOT NULL),
    CHECK ((reviewed_by IS NULL) = (reviewed_at IS NULL))
);

-- Open/closed consistency is enforced by the store, not by a CHECK, so that
-- drifted rows can still be loaded and repaired by the shift audit.
CREATE TABLE IF NOT EXISTS shifts (
    shift_id    TEXT PRIMARY KEY,
    guard_id    TEXT NOT NULL REFERENCES persons(person_id),
    site        TEXT NOT NULL,
    period      TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    ended_at    TEXT,
    active      INTEGER NOT NULL DEFAULT 1
);

-- Access events are append-only and `seq` is their order. `shift_id` is the
-- shift the event is bound to (an exit inherits its entry's); `registered_in`
-- is the shift during which it was actually registered.
CREATE TABLE IF NOT EXISTS access_events (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id       TEXT NOT NULL UNIQUE,
    subject_id     TEXT NOT NULL REFERENCES persons(person_id),
    direction      TEXT NOT NULL CHECK (direction IN ('entry', 'exit')),
    recorded_at    TEXT NOT NULL,  -- RFC 3339 UTC, fixed-width micros
    registered_by  TEXT REFERENCES persons(person_id),
    shift_id       TEXT REFERENCES shifts(shift_id),
    registered_in  TEXT REFERENCES shifts(shift_id),
    site           TEXT
);

CREATE TABLE IF NOT EXISTS access_event_equipment (
    event_seq     INTEGER NOT NULL REFERENCES access_events(seq),
    equipment_id  TEXT NOT NULL REFERENCES equipment(equipment_id),
    recorded_at   TEXT NOT NULL,
    PRIMARY KEY (event_seq, equipment_id)
);

CREATE TABLE IF NOT EXISTS password_reset_challenges (
    challenge_id  TEXT PRIMARY KEY,
    person_id     TEXT NOT NULL REFERENCES persons(person_id),
    salt          TEXT NOT NULL,
    code_hash     TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    expires_at    TEXT NOT NULL,
    attempts      INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
    used_at       TEXT
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id  TEXT PRIMARY KEY,
    recipient_id     TEXT NOT NULL REFERENCES persons(person_id),
    severity         TEXT NOT NULL,
    title            TEXT NOT NULL,
    message          TEXT NOT NULL,
    data             TEXT NOT NULL DEFAULT 'null',
    created_at       TEXT NOT NULL,
    read_at          TEXT
);

CREATE INDEX IF NOT EXISTS persons_role_idx         ON persons(role);
CREATE INDEX IF NOT EXISTS equipment_owner_idx      ON equipment(owner_id, state);
CREATE INDEX IF NOT EXISTS shifts_guard_active_idx  ON shifts(guard_id, active);
CREATE INDEX IF NOT EXISTS access_subject_idx       ON access_events(subject_id, seq);
CREATE INDEX IF NOT EXISTS access_shift_idx         ON access_events(shift_id);
CREATE INDEX IF NOT EXISTS access_registered_in_idx ON access_events(registered_in);
CREATE INDEX IF NOT EXISTS access_recorded_idx      ON access_events(recorded_at);
CREATE INDEX IF NOT EXISTS access_equipment_idx
    ON access_event_equipment(equipment_id, event_seq);
CREATE INDEX IF NOT EXISTS challenges_person_idx
    ON password_reset_challenges(person_id, created_at);
CREATE INDEX IF NOT EXISTS notifications_recipient_idx
    ON notifications(recipient_id, created_at);

PRAGMA user_version = 1;
";
