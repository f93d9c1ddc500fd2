//! SQL used by the remote document store.
//!
//! Every collection shares one table of JSONB documents, scoped by project.

/**
 * Channel every write notifies, with `<project>/<collection>` as the payload
 */
pub const CHANGES_CHANNEL: &str = "northpole_changes";

pub const CREATE_DOCUMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    project     TEXT        NOT NULL,
    collection  TEXT        NOT NULL,
    id          TEXT        NOT NULL,
    body        JSONB       NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (project, collection, id)
)"#;

pub const SELECT_ALL: &str =
    "SELECT body FROM documents WHERE project = $1 AND collection = $2 ORDER BY created_at ASC, id ASC";

pub const SELECT_ONE: &str =
    "SELECT body FROM documents WHERE project = $1 AND collection = $2 AND id = $3";

pub const SELECT_ONE_FOR_UPDATE: &str =
    "SELECT body FROM documents WHERE project = $1 AND collection = $2 AND id = $3 FOR UPDATE";

pub const UPSERT: &str = r#"
INSERT INTO documents (project, collection, id, body) VALUES ($1, $2, $3, $4)
ON CONFLICT (project, collection, id)
DO UPDATE SET body = EXCLUDED.body, updated_at = now()"#;

/**
 * Upsert for poll options: the stored `votes` survives an edit, only
 * `BUMP_OPTION` moves it
 */
pub const UPSERT_KEEPING_VOTES: &str = r#"
INSERT INTO documents (project, collection, id, body) VALUES ($1, $2, $3, $4)
ON CONFLICT (project, collection, id)
DO UPDATE SET
    body = EXCLUDED.body || jsonb_build_object('votes', COALESCE(documents.body->'votes', '0'::jsonb)),
    updated_at = now()"#;

pub const DELETE: &str =
    "DELETE FROM documents WHERE project = $1 AND collection = $2 AND id = $3";

/**
 * In-place counter arithmetic on a poll option, constrained to its poll
 */
pub const BUMP_OPTION: &str = r#"
UPDATE documents
SET body = jsonb_set(body, '{votes}', to_jsonb(COALESCE((body->>'votes')::bigint, 0) + $5))
WHERE project = $1 AND collection = $2 AND id = $3 AND body->>'pollId' = $4"#;

/**
 * Serializes vote changes of one participant in one poll until commit, even
 * while no vote row exists yet to lock
 */
pub const LOCK_VOTE: &str = "SELECT pg_advisory_xact_lock(hashtext($1))";

pub const NOTIFY: &str = "SELECT pg_notify($1, $2)";
