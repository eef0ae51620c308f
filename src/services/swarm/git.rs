//! Git branch isolation for swarm agents.
//!
//! Branch creation and merges shell out to `git` in the swarm's working
//! directory. Merge conflicts abort that agent's merge and are reported;
//! later merges still proceed.

use tokio::process::Command;

use crate::domain::errors::{DomainError, DomainResult};

async fn run_git(working_dir: &str, args: &[&str]) -> DomainResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(working_dir)
        .output()
        .await
        .map_err(|e| DomainError::Runtime(format!("failed to run git: {e}")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(DomainError::Runtime(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

/// Branch name for one agent: `{prefix}/{agent_name}`.
pub fn agent_branch_name(prefix: &str, agent_name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), agent_name)
}

/// Create and check out a fresh agent branch from the base branch.
pub async fn checkout_agent_branch(
    working_dir: &str,
    branch: &str,
    base_branch: Option<&str>,
) -> DomainResult<()> {
    match base_branch {
        Some(base) => run_git(working_dir, &["checkout", "-B", branch, base]).await?,
        None => run_git(working_dir, &["checkout", "-B", branch]).await?,
    };
    Ok(())
}

/// Merge one agent branch into the target. Returns the conflict message
/// instead of erroring so the caller can keep merging siblings; the
/// conflicted merge is aborted to leave the tree clean.
pub async fn merge_branch(
    working_dir: &str,
    branch: &str,
    target: &str,
) -> DomainResult<Option<String>> {
    run_git(working_dir, &["checkout", target]).await?;
    match run_git(working_dir, &["merge", "--no-ff", branch]).await {
        Ok(_) => Ok(None),
        Err(DomainError::Runtime(message)) => {
            let _ = run_git(working_dir, &["merge", "--abort"]).await;
            Ok(Some(message))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_naming() {
        assert_eq!(agent_branch_name("swarm/feature", "worker"), "swarm/feature/worker");
        assert_eq!(agent_branch_name("swarm/", "worker"), "swarm/worker");
    }
}
