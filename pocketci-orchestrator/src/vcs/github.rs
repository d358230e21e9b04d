//! GitHub webhook adapter
//!
//! Verifies the `X-Hub-Signature` HMAC and decodes the payload subset the
//! orchestrator needs into a [`NormalizedEvent`]. GitHub signs this header
//! with HMAC-SHA1; verification happens before any parsing so unauthenticated
//! requests never reach the JSON decoder.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use thiserror::Error;

use pocketci_core::domain::event::{
    GITHUB_PULL_REQUEST, GITHUB_PUSH, GITHUB_RELEASE, GITHUB_VENDOR, NormalizedEvent, branch_name,
};

type HmacSha1 = Hmac<Sha1>;

/// Errors from decoding a GitHub webhook payload.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The event type has no decoder.
    #[error("event {0} is not supported")]
    UnsupportedEvent(String),

    /// The payload was not the JSON shape GitHub documents for the event.
    #[error("invalid {event} payload: {source}")]
    InvalidPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Verifies a GitHub webhook signature against the payload and secret.
///
/// The header carries `sha1=<hex>`; comparison is constant time via the HMAC
/// verifier. Malformed headers fail verification, they never panic.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let hex_sig = match signature_header.strip_prefix("sha1=") {
        Some(sig) => sig,
        None => return false,
    };

    let expected = match hex::decode(hex_sig) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    let mut mac = match HmacSha1::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&expected).is_ok()
}

/// Computes the HMAC-SHA1 of a payload. Test helper for producing valid
/// `X-Hub-Signature` values.
#[cfg(test)]
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

#[derive(Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    action: String,
    number: u64,
    pull_request: PullRequest,
    repository: Repository,
}

#[derive(Deserialize)]
struct PullRequest {
    head: Branch,
    base: Branch,
}

#[derive(Deserialize)]
struct Branch {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

#[derive(Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    after: String,
    repository: Repository,
}

#[derive(Deserialize)]
struct ReleasePayload {
    action: String,
    release: Release,
    repository: Repository,
}

#[derive(Deserialize)]
struct Release {
    tag_name: String,
}

/// Decodes a GitHub webhook into a [`NormalizedEvent`].
///
/// The changed-file list starts empty; the repository fetcher fills it in
/// once the commit is materialized.
pub fn parse_webhook(event_type: &str, payload: &[u8]) -> Result<NormalizedEvent, VcsError> {
    match event_type {
        GITHUB_PULL_REQUEST => {
            let pr: PullRequestPayload = decode(event_type, payload)?;
            let branch = branch_name(&pr.pull_request.head.git_ref).to_string();
            let env_vars = context_vars(
                &pr.pull_request.head.sha,
                event_type,
                &format!("refs/pull/{}/merge", pr.number),
            );

            Ok(NormalizedEvent {
                vendor: GITHUB_VENDOR.to_string(),
                event_type: event_type.to_string(),
                filter: pr.action,
                repo_full_name: pr.repository.full_name,
                git_ref: branch,
                sha: pr.pull_request.head.sha,
                base_ref: Some(branch_name(&pr.pull_request.base.git_ref).to_string()),
                base_sha: Some(pr.pull_request.base.sha),
                pr_number: Some(pr.number),
                changed_files: Vec::new(),
                payload: payload.to_vec(),
                env_vars,
            })
        }
        GITHUB_PUSH => {
            let push: PushPayload = decode(event_type, payload)?;
            let branch = branch_name(&push.git_ref).to_string();
            let env_vars = context_vars(&push.after, event_type, &branch);

            Ok(NormalizedEvent {
                vendor: GITHUB_VENDOR.to_string(),
                event_type: event_type.to_string(),
                filter: branch.clone(),
                repo_full_name: push.repository.full_name,
                git_ref: branch,
                sha: push.after,
                base_ref: None,
                base_sha: None,
                pr_number: None,
                changed_files: Vec::new(),
                payload: payload.to_vec(),
                env_vars,
            })
        }
        GITHUB_RELEASE => {
            // No head commit to check out; the fetcher clones the tag and
            // skips the checkout step for the empty sha.
            let release: ReleasePayload = decode(event_type, payload)?;
            let env_vars = context_vars("", event_type, &release.release.tag_name);

            Ok(NormalizedEvent {
                vendor: GITHUB_VENDOR.to_string(),
                event_type: event_type.to_string(),
                filter: release.action,
                repo_full_name: release.repository.full_name,
                git_ref: release.release.tag_name,
                sha: String::new(),
                base_ref: None,
                base_sha: None,
                pr_number: None,
                changed_files: Vec::new(),
                payload: payload.to_vec(),
                env_vars,
            })
        }
        other => Err(VcsError::UnsupportedEvent(other.to_string())),
    }
}

fn decode<'a, T: Deserialize<'a>>(event: &str, payload: &'a [u8]) -> Result<T, VcsError> {
    serde_json::from_slice(payload).map_err(|source| VcsError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}

/// The GitHub Actions-style context pipelines expect to find.
fn context_vars(sha: &str, event_name: &str, git_ref: &str) -> HashMap<String, String> {
    HashMap::from([
        ("GITHUB_SHA".to_string(), sha.to_string()),
        ("GITHUB_ACTIONS".to_string(), "true".to_string()),
        ("GITHUB_EVENT_NAME".to_string(), event_name.to_string()),
        (
            "GITHUB_EVENT_PATH".to_string(),
            "./raw-event.json".to_string(),
        ),
        ("GITHUB_REF".to_string(), git_ref.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"hook-secret";

    fn pr_payload() -> Vec<u8> {
        serde_json::json!({
            "action": "opened",
            "number": 42,
            "pull_request": {
                "head": {"ref": "refs/heads/feature-x", "sha": "headsha"},
                "base": {"ref": "refs/heads/main", "sha": "basesha"}
            },
            "repository": {"full_name": "pocketci/pocketci"}
        })
        .to_string()
        .into_bytes()
    }

    fn push_payload() -> Vec<u8> {
        serde_json::json!({
            "ref": "refs/heads/main",
            "after": "pushsha",
            "repository": {"full_name": "pocketci/pocketci"}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn valid_signature_verifies() {
        let payload = b"payload bytes";
        let header = compute_signature(payload, SECRET);
        assert!(verify_signature(payload, &header, SECRET));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = b"payload bytes";
        let header = compute_signature(payload, SECRET);
        assert!(!verify_signature(payload, &header, b"other-secret"));
    }

    #[test]
    fn modified_payload_fails() {
        let header = compute_signature(b"original", SECRET);
        assert!(!verify_signature(b"tampered", &header, SECRET));
    }

    #[test]
    fn malformed_headers_fail_without_panicking() {
        let payload = b"payload";
        assert!(!verify_signature(payload, "", SECRET));
        assert!(!verify_signature(payload, "sha1=", SECRET));
        assert!(!verify_signature(payload, "sha1=zzzz", SECRET));
        assert!(!verify_signature(payload, "sha256=abcd", SECRET));
        assert!(!verify_signature(payload, "abcd1234", SECRET));
    }

    #[test]
    fn pull_request_decodes() {
        let payload = pr_payload();
        let event = parse_webhook("pull_request", &payload).unwrap();

        assert_eq!(event.vendor, "github");
        assert_eq!(event.event_type, "pull_request");
        assert_eq!(event.filter, "opened");
        assert_eq!(event.repo_full_name, "pocketci/pocketci");
        assert_eq!(event.git_ref, "feature-x");
        assert_eq!(event.sha, "headsha");
        assert_eq!(event.base_ref.as_deref(), Some("main"));
        assert_eq!(event.base_sha.as_deref(), Some("basesha"));
        assert_eq!(event.pr_number, Some(42));
        assert!(event.changed_files.is_empty());
        assert_eq!(event.payload, payload);
        assert_eq!(
            event.env_vars.get("GITHUB_REF").map(String::as_str),
            Some("refs/pull/42/merge")
        );
        assert_eq!(
            event.env_vars.get("GITHUB_EVENT_NAME").map(String::as_str),
            Some("pull_request")
        );
    }

    #[test]
    fn push_decodes() {
        let event = parse_webhook("push", &push_payload()).unwrap();

        assert_eq!(event.filter, "main");
        assert_eq!(event.git_ref, "main");
        assert_eq!(event.sha, "pushsha");
        assert!(event.base_ref.is_none());
        assert!(event.pr_number.is_none());
        assert_eq!(
            event.env_vars.get("GITHUB_SHA").map(String::as_str),
            Some("pushsha")
        );
        assert_eq!(
            event.env_vars.get("GITHUB_REF").map(String::as_str),
            Some("main")
        );
    }

    #[test]
    fn release_decodes_with_empty_sha() {
        let payload = serde_json::json!({
            "action": "published",
            "release": {"tag_name": "v1.2.3"},
            "repository": {"full_name": "pocketci/pocketci"}
        })
        .to_string()
        .into_bytes();

        let event = parse_webhook("release", &payload).unwrap();
        assert_eq!(event.filter, "published");
        assert_eq!(event.git_ref, "v1.2.3");
        assert!(event.sha.is_empty());
    }

    #[test]
    fn unknown_event_is_unsupported() {
        let err = parse_webhook("issue_comment", b"{}").unwrap_err();
        assert!(matches!(err, VcsError::UnsupportedEvent(e) if e == "issue_comment"));
    }

    #[test]
    fn garbage_payload_is_invalid() {
        let err = parse_webhook("push", b"not json").unwrap_err();
        assert!(matches!(err, VcsError::InvalidPayload { .. }));
    }
}
