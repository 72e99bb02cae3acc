//! forge::mock
//!
//! Mock forge implementation for deterministic testing.
//!
//! # Design
//!
//! The mock forge stores PRs in memory, records every call, and can be
//! told to fail a given operation (always, or only for the first N calls
//! so retry paths can be exercised).
//!
//! # Example
//!
//! ```
//! use converge::forge::mock::MockForge;
//! use converge::forge::{CreatePrRequest, Forge};
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//!
//! let created = forge.create_pr(CreatePrRequest {
//!     head: "feat/code-migration".to_string(),
//!     base: "main".to_string(),
//!     title: "Feat: Code Migration".to_string(),
//!     ..Default::default()
//! }).await.unwrap();
//!
//! assert_eq!(created.pr.number, 1);
//! assert_eq!(forge.list_open_prs("feat/code-migration").await.unwrap().len(), 1);
//! # });
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::traits::{
    short_branch, CreatePrRequest, CreatedPr, Forge, ForgeError, PullRequest, UpdatePrRequest,
};

/// Mock forge for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockForge {
    inner: Arc<Mutex<MockForgeInner>>,
}

#[derive(Debug)]
struct MockForgeInner {
    /// Open PRs by number.
    prs: BTreeMap<u64, PullRequest>,
    next_pr_number: u64,
    default_branch: String,
    fail_on: Option<FailOn>,
    /// Remaining failures; `None` fails forever.
    fail_remaining: Option<usize>,
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    ListOpenPrs(ForgeError),
    CreatePr(ForgeError),
    UpdatePr(ForgeError),
    DefaultBranch(ForgeError),
    /// PR creation succeeds but every label yields a warning.
    Labels,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    ListOpenPrs {
        head: String,
    },
    CreatePr {
        head: String,
        base: String,
        title: String,
        body: Option<String>,
        labels: Vec<String>,
    },
    UpdatePr {
        number: u64,
        body: Option<String>,
    },
    DefaultBranch,
}

impl MockOperation {
    /// Whether the call changes provider state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            MockOperation::CreatePr { .. } | MockOperation::UpdatePr { .. }
        )
    }
}

impl MockForge {
    /// Create a new empty mock forge whose default branch is `main`.
    pub fn new() -> Self {
        Self::with_prs(Vec::new())
    }

    /// Create a mock forge with pre-existing open PRs.
    pub fn with_prs(prs: Vec<PullRequest>) -> Self {
        let max_number = prs.iter().map(|p| p.number).max().unwrap_or(0);
        let prs: BTreeMap<u64, PullRequest> = prs.into_iter().map(|p| (p.number, p)).collect();

        Self {
            inner: Arc::new(Mutex::new(MockForgeInner {
                prs,
                next_pr_number: max_number + 1,
                default_branch: "main".to_string(),
                fail_on: None,
                fail_remaining: None,
                operations: Vec::new(),
            })),
        }
    }

    /// Override the default branch reported by the provider.
    pub fn with_default_branch(self, branch: impl Into<String>) -> Self {
        self.state().default_branch = branch.into();
        self
    }

    /// Fail the given operation on every call.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        {
            let mut inner = self.state();
            inner.fail_on = Some(fail_on);
            inner.fail_remaining = None;
        }
        self
    }

    /// Fail the given operation for the first `times` calls only.
    pub fn fail_on_times(self, fail_on: FailOn, times: usize) -> Self {
        {
            let mut inner = self.state();
            inner.fail_on = Some(fail_on);
            inner.fail_remaining = Some(times);
        }
        self
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.state().operations.clone()
    }

    /// Number of recorded calls that changed provider state.
    pub fn mutation_count(&self) -> usize {
        self.state()
            .operations
            .iter()
            .filter(|op| op.is_mutation())
            .count()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Get all PRs (for test verification), ordered by number.
    pub fn all_prs(&self) -> Vec<PullRequest> {
        self.state().prs.values().cloned().collect()
    }

    /// Get the count of PRs.
    pub fn pr_count(&self) -> usize {
        self.state().prs.len()
    }

    fn state(&self) -> MutexGuard<'_, MockForgeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: MockOperation) {
        self.state().operations.push(op);
    }

    /// Return the configured error if `op` should fail now.
    fn check_fail(&self, op: &str) -> Result<(), ForgeError> {
        let mut inner = self.state();
        let err = match (&inner.fail_on, op) {
            (Some(FailOn::ListOpenPrs(e)), "list_open_prs")
            | (Some(FailOn::CreatePr(e)), "create_pr")
            | (Some(FailOn::UpdatePr(e)), "update_pr")
            | (Some(FailOn::DefaultBranch(e)), "default_branch") => e.clone(),
            _ => return Ok(()),
        };
        match inner.fail_remaining {
            Some(0) => Ok(()),
            Some(n) => {
                inner.fail_remaining = Some(n - 1);
                Err(err)
            }
            None => Err(err),
        }
    }
}

impl Default for MockForge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Forge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_open_prs(&self, head: &str) -> Result<Vec<PullRequest>, ForgeError> {
        self.record(MockOperation::ListOpenPrs {
            head: head.to_string(),
        });
        self.check_fail("list_open_prs")?;

        let head = short_branch(head);
        Ok(self
            .state()
            .prs
            .values()
            .filter(|pr| short_branch(&pr.head) == head)
            .cloned()
            .collect())
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<CreatedPr, ForgeError> {
        self.record(MockOperation::CreatePr {
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
            body: request.body.clone(),
            labels: request.labels.clone(),
        });
        self.check_fail("create_pr")?;

        let mut inner = self.state();
        let number = inner.next_pr_number;
        inner.next_pr_number += 1;

        let pr = PullRequest {
            number,
            url: format!("https://forge.mock/pulls/{}", number),
            head: short_branch(&request.head).to_string(),
            base: short_branch(&request.base).to_string(),
            title: request.title,
            body: request.body,
        };
        inner.prs.insert(number, pr.clone());

        let warnings = match inner.fail_on {
            Some(FailOn::Labels) => request
                .labels
                .iter()
                .map(|l| format!("failed to add label '{}' to PR {}", l, number))
                .collect(),
            _ => Vec::new(),
        };

        Ok(CreatedPr { pr, warnings })
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError> {
        self.record(MockOperation::UpdatePr {
            number: request.number,
            body: request.body.clone(),
        });
        self.check_fail("update_pr")?;

        let mut inner = self.state();
        let pr = inner
            .prs
            .get_mut(&request.number)
            .ok_or_else(|| ForgeError::NotFound(format!("PR #{}", request.number)))?;
        pr.body = request.body;
        Ok(pr.clone())
    }

    async fn default_branch(&self) -> Result<String, ForgeError> {
        self.record(MockOperation::DefaultBranch);
        self.check_fail("default_branch")?;
        Ok(self.state().default_branch.clone())
    }
}
