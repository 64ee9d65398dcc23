//! In-memory stand-ins for the version-control engine and the hosting service.

use crate::{
    errors::{ReviewError, ReviewResult},
    git::{CommitInfo, VersionControl},
    host::{Host, NewPullRequest, PullRequest, PullRequestState},
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// A hosting service holding branch tips and pull requests in memory.
#[derive(Debug, Default)]
pub struct FakeRemote {
    state: Mutex<RemoteData>,
}

#[derive(Debug, Default)]
struct RemoteData {
    branches: HashMap<String, String>,
    pulls: Vec<PullRequest>,
    unreachable: HashSet<String>,
    slow: HashSet<String>,
    queried: HashSet<String>,
    pushes: HashMap<String, usize>,
    moves_after_query: HashMap<String, String>,
    issues: HashMap<u64, String>,
    failing_pulls: bool,
}

impl FakeRemote {
    fn state(&self) -> MutexGuard<'_, RemoteData> {
        self.state.lock().unwrap()
    }

    pub fn set_tip(&self, branch: &str, hash: &str) {
        self.state()
            .branches
            .insert(branch.to_string(), hash.to_string());
    }

    pub fn tip(&self, branch: &str) -> Option<String> {
        self.state().branches.get(branch).cloned()
    }

    /// Makes every query and push for `branch` fail.
    pub fn set_unreachable(&self, branch: &str) {
        self.state().unreachable.insert(branch.to_string());
    }

    /// Makes tip queries for `branch` take far longer than any test timeout.
    pub fn set_slow(&self, branch: &str) {
        self.state().slow.insert(branch.to_string());
    }

    /// Returns `true` if the tip of `branch` was ever queried.
    pub fn queried(&self, branch: &str) -> bool {
        self.state().queried.contains(branch)
    }

    /// Moves `branch` to `hash` right after its tip is first queried, as a reviewer pushing
    /// during an export would.
    pub fn move_after_query(&self, branch: &str, hash: &str) {
        self.state()
            .moves_after_query
            .insert(branch.to_string(), hash.to_string());
    }

    /// Updates `branch` to `hash` if it is still at `expected`.
    pub fn push(&self, branch: &str, hash: &str, expected: Option<&str>) -> ReviewResult<()> {
        let mut state = self.state();
        if state.unreachable.contains(branch) {
            return Err(ReviewError::NetworkFailure(format!("cannot push `{}`", branch)));
        }
        let current = state.branches.get(branch).cloned();
        if current.as_deref() != expected {
            return Err(ReviewError::ForeignDivergence {
                branch: branch.to_string(),
                tip: current.unwrap_or_default(),
            });
        }
        *state.pushes.entry(branch.to_string()).or_default() += 1;
        state.branches.insert(branch.to_string(), hash.to_string());
        Ok(())
    }

    pub fn push_count(&self, branch: &str) -> usize {
        self.state().pushes.get(branch).copied().unwrap_or_default()
    }

    /// Makes every pull request call fail until reset.
    pub fn fail_pull_requests(&self, failing: bool) {
        self.state().failing_pulls = failing;
    }

    /// Opens a pull request directly, as someone using the web interface would.
    pub fn add_pull(&self, head: &str, base: &str) -> u64 {
        let mut state = self.state();
        let number = state.pulls.len() as u64 + 1;
        state.pulls.push(PullRequest {
            number,
            base: base.to_string(),
            head: head.to_string(),
            title: head.to_string(),
            state: PullRequestState::Open,
            draft: false,
            url: pull_url(number),
        });
        number
    }

    pub fn set_pull_state(&self, number: u64, pr_state: PullRequestState) {
        if let Some(pr) = self.state().pulls.iter_mut().find(|pr| pr.number == number) {
            pr.state = pr_state;
        }
    }

    pub fn pull(&self, number: u64) -> Option<PullRequest> {
        self.state()
            .pulls
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
    }

    pub fn add_issue(&self, number: u64, title: &str) {
        self.state().issues.insert(number, title.to_string());
    }

    /// All pull requests, in creation order.
    pub fn pulls(&self) -> Vec<PullRequest> {
        self.state().pulls.clone()
    }

    fn check_pulls(&self) -> ReviewResult<()> {
        if self.state().failing_pulls {
            return Err(ReviewError::NetworkFailure("pull requests unavailable".into()));
        }
        Ok(())
    }
}

fn pull_url(number: u64) -> String {
    format!("https://example.test/pull/{}", number)
}

#[async_trait]
impl Host for FakeRemote {
    async fn branch_tip(&self, branch: &str) -> ReviewResult<Option<String>> {
        let (tip, unreachable, slow) = {
            let mut state = self.state();
            state.queried.insert(branch.to_string());
            let tip = state.branches.get(branch).cloned();
            if let Some(hash) = state.moves_after_query.remove(branch) {
                state.branches.insert(branch.to_string(), hash);
            }
            (
                tip,
                state.unreachable.contains(branch),
                state.slow.contains(branch),
            )
        };

        if unreachable {
            return Err(ReviewError::NetworkFailure(format!(
                "cannot reach `{}`",
                branch
            )));
        }
        if slow {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(tip)
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> ReviewResult<PullRequest> {
        self.check_pulls()?;
        let mut state = self.state();
        let number = state.pulls.len() as u64 + 1;
        let pr = PullRequest {
            number,
            base: request.base.clone(),
            head: request.head.clone(),
            title: request.title.clone(),
            state: PullRequestState::Open,
            draft: false,
            url: pull_url(number),
        };
        state.pulls.push(pr.clone());
        Ok(pr)
    }

    async fn update_pull_request_base(
        &self,
        number: u64,
        base: &str,
    ) -> ReviewResult<PullRequest> {
        self.check_pulls()?;
        let mut state = self.state();
        let pr = state
            .pulls
            .iter_mut()
            .find(|pr| pr.number == number)
            .ok_or_else(|| ReviewError::NetworkFailure(format!("no pull request #{}", number)))?;
        pr.base = base.to_string();
        Ok(pr.clone())
    }

    async fn get_pull_request(&self, number: u64) -> ReviewResult<PullRequest> {
        self.check_pulls()?;
        self.pull(number)
            .ok_or_else(|| ReviewError::NetworkFailure(format!("no pull request #{}", number)))
    }

    async fn find_pull_request(&self, head: &str) -> ReviewResult<Option<PullRequest>> {
        self.check_pulls()?;
        Ok(self
            .state()
            .pulls
            .iter()
            .find(|pr| pr.head == head && pr.state == PullRequestState::Open)
            .cloned())
    }

    async fn issue_title(&self, number: u64) -> ReviewResult<String> {
        self.state()
            .issues
            .get(&number)
            .cloned()
            .ok_or_else(|| ReviewError::NetworkFailure(format!("no issue #{}", number)))
    }

    fn pull_request_url(&self, number: u64) -> String {
        pull_url(number)
    }
}

/// A commit of the [FakeRepo]. Trees are opaque labels.
#[derive(Debug, Clone)]
struct FakeCommit {
    parents: Vec<String>,
    tree: String,
    message: String,
    authored_at: i64,
}

const AUTHOR_EMAIL: &str = "dev@example.com";

/// An in-memory repository with a working branch `work` and an upstream `origin/main`, both
/// starting at a root commit. Pushes land in the shared [FakeRemote]; fetching `main` copies the
/// remote's `main` tip, if any, into `origin/main`.
#[derive(Debug)]
pub struct FakeRepo {
    remote: Arc<FakeRemote>,
    state: Mutex<RepoState>,
}

#[derive(Debug, Default)]
struct RepoState {
    commits: HashMap<String, FakeCommit>,
    refs: HashMap<String, String>,
    clock: i64,
    conflict_tree: Option<String>,
    in_progress: bool,
}

impl RepoState {
    fn insert(&mut self, commit: FakeCommit) -> String {
        let mut hasher = Sha256::new();
        for parent in &commit.parents {
            hasher.update(parent.as_bytes());
        }
        hasher.update(b"\0");
        hasher.update(commit.tree.as_bytes());
        hasher.update(b"\0");
        hasher.update(commit.message.as_bytes());
        hasher.update(commit.authored_at.to_be_bytes());

        let id = hex::encode(hasher.finalize());
        self.commits.insert(id.clone(), commit);
        id
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        1_700_000_000 + self.clock
    }

    fn resolve(&self, reference: &str) -> ReviewResult<String> {
        if let Some(id) = self.refs.get(reference) {
            return Ok(id.clone());
        }
        if self.commits.contains_key(reference) {
            return Ok(reference.to_string());
        }
        Err(ReviewError::Git2(git2::Error::from_str(&format!(
            "unknown reference `{}`",
            reference
        ))))
    }

    fn commit(&self, id: &str) -> ReviewResult<&FakeCommit> {
        self.commits.get(id).ok_or_else(|| {
            ReviewError::Git2(git2::Error::from_str(&format!("unknown commit `{}`", id)))
        })
    }

    /// Every commit reachable from `tip`, including `tip`.
    fn ancestors(&self, tip: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([tip.to_string()]);
        while let Some(id) = queue.pop_front() {
            if let Some(commit) = self.commits.get(&id) {
                queue.extend(commit.parents.iter().cloned());
            }
            seen.insert(id);
        }
        seen
    }

    fn merge_base(&self, a: &str, b: &str) -> Option<String> {
        let reachable = self.ancestors(a);
        let mut queue = VecDeque::from([b.to_string()]);
        let mut seen = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if reachable.contains(&id) {
                return Some(id);
            }
            if seen.insert(id.clone()) {
                if let Some(commit) = self.commits.get(&id) {
                    queue.extend(commit.parents.iter().cloned());
                }
            }
        }
        None
    }

    /// Commits reachable from `tip` but not from `base`, parents before children.
    fn between(&self, base: &str, tip: &str) -> Vec<String> {
        let hidden = self.ancestors(base);
        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        self.visit(tip, &hidden, &mut visited, &mut ordered);
        ordered
    }

    fn visit(
        &self,
        id: &str,
        hidden: &HashSet<String>,
        visited: &mut HashSet<String>,
        ordered: &mut Vec<String>,
    ) {
        if hidden.contains(id) || !visited.insert(id.to_string()) {
            return;
        }
        if let Some(commit) = self.commits.get(id) {
            for parent in &commit.parents {
                self.visit(parent, hidden, visited, ordered);
            }
        }
        ordered.push(id.to_string());
    }

    fn replay(&mut self, id: &str, parent: &str, message: Option<&str>) -> ReviewResult<String> {
        let original = self.commit(id)?.clone();
        Ok(self.insert(FakeCommit {
            parents: vec![parent.to_string()],
            message: message.map_or(original.message, ToOwned::to_owned),
            ..original
        }))
    }

    /// Rewrites `id` on `branch` with `edit`, replaying its descendants on top.
    fn rewrite(
        &mut self,
        branch: &str,
        id: &str,
        edit: impl FnOnce(&mut FakeCommit),
    ) -> String {
        let tip = self.refs[branch].clone();
        let mut chain = Vec::new();
        let mut cursor = tip;
        while cursor != id {
            chain.push(cursor.clone());
            cursor = self.commits[&cursor].parents[0].clone();
        }

        let mut edited = self.commits[id].clone();
        edit(&mut edited);
        let new_id = self.insert(edited);

        let mut parent = new_id.clone();
        for descendant in chain.iter().rev() {
            parent = self.replay(descendant, &parent, None).unwrap();
        }
        self.refs.insert(branch.to_string(), parent);
        new_id
    }
}

impl FakeRepo {
    pub fn new(remote: Arc<FakeRemote>) -> Self {
        let mut state = RepoState::default();
        let root = state.insert(FakeCommit {
            parents: vec![],
            tree: "root".to_string(),
            message: "root".to_string(),
            authored_at: 1_700_000_000,
        });
        state.refs.insert("origin/main".to_string(), root.clone());
        state.refs.insert("work".to_string(), root);

        Self {
            remote,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap()
    }

    /// Commits `tree` on top of `branch`, creating the branch from `origin/main` if needed.
    pub fn commit(&self, branch: &str, tree: &str, message: &str) -> String {
        let authored_at = self.state().tick();
        self.commit_at(branch, tree, message, authored_at)
    }

    /// Like [FakeRepo::commit], with a fixed author time.
    pub fn commit_at(&self, branch: &str, tree: &str, message: &str, authored_at: i64) -> String {
        let mut state = self.state();
        let parent = state
            .refs
            .get(branch)
            .or_else(|| state.refs.get("origin/main"))
            .cloned()
            .unwrap();
        let id = state.insert(FakeCommit {
            parents: vec![parent],
            tree: tree.to_string(),
            message: message.to_string(),
            authored_at,
        });
        state.refs.insert(branch.to_string(), id.clone());
        id
    }

    /// Creates a merge commit of `parents` on `branch`.
    pub fn merge(&self, branch: &str, parents: &[String], message: &str) -> String {
        let mut state = self.state();
        let authored_at = state.tick();
        let id = state.insert(FakeCommit {
            parents: parents.to_vec(),
            tree: "merged".to_string(),
            message: message.to_string(),
            authored_at,
        });
        state.refs.insert(branch.to_string(), id.clone());
        id
    }

    /// Points `reference` at a new root commit.
    pub fn orphan(&self, reference: &str, tree: &str) -> String {
        let mut state = self.state();
        let authored_at = state.tick();
        let id = state.insert(FakeCommit {
            parents: vec![],
            tree: tree.to_string(),
            message: tree.to_string(),
            authored_at,
        });
        state.refs.insert(reference.to_string(), id.clone());
        id
    }

    pub fn resolve(&self, reference: &str) -> String {
        self.state().resolve(reference).unwrap()
    }

    pub fn tree_of(&self, id: &str) -> String {
        self.state().commits[id].tree.clone()
    }

    pub fn message_of(&self, id: &str) -> String {
        self.state().commits[id].message.clone()
    }

    /// Changes the message of `id`, keeping its tree and author.
    pub fn reword(&self, branch: &str, id: &str, message: &str) -> String {
        self.state()
            .rewrite(branch, id, |c| c.message = message.to_string())
    }

    /// Changes the tree of `id`, keeping its message and author.
    pub fn amend(&self, branch: &str, id: &str, tree: &str) -> String {
        self.state().rewrite(branch, id, |c| c.tree = tree.to_string())
    }

    /// Reorders the commits of `branch` above `origin/main`; `order[i]` is the old position of the
    /// commit that ends up at position `i`.
    pub fn reorder(&self, branch: &str, order: &[usize]) {
        let mut state = self.state();
        let tip = state.refs[branch].clone();
        let base = state.merge_base(&tip, &state.refs["origin/main"]).unwrap();
        let commits = state.between(&base, &tip);

        let mut parent = base;
        for &index in order {
            parent = state.replay(&commits[index], &parent, None).unwrap();
        }
        state.refs.insert(branch.to_string(), parent);
    }

    /// Lands a commit with `tree` on the remote `main`, visible after the next fetch.
    pub fn advance_upstream(&self, tree: &str) -> String {
        let mut state = self.state();
        let parent = self
            .remote
            .tip("main")
            .unwrap_or_else(|| state.refs["origin/main"].clone());
        let authored_at = state.tick();
        let id = state.insert(FakeCommit {
            parents: vec![parent],
            tree: tree.to_string(),
            message: format!("Upstream {}", tree),
            authored_at,
        });
        self.remote.set_tip("main", &id);
        id
    }

    /// Makes rebasing any commit with `tree` stop with a conflict.
    pub fn set_conflict_tree(&self, tree: &str) {
        self.state().conflict_tree = Some(tree.to_string());
    }

    /// Simulates a rebase or merge left in progress.
    pub fn set_in_progress(&self, in_progress: bool) {
        self.state().in_progress = in_progress;
    }
}

impl VersionControl for FakeRepo {
    fn resolve_commit(&self, reference: &str) -> ReviewResult<String> {
        self.state().resolve(reference)
    }

    fn find_merge_base(&self, a: &str, b: &str) -> ReviewResult<Option<String>> {
        Ok(self.state().merge_base(a, b))
    }

    fn commits_between(&self, base: &str, tip: &str) -> ReviewResult<Vec<CommitInfo>> {
        let state = self.state();
        if !state.ancestors(tip).contains(base) {
            return Err(ReviewError::HistoryInconsistency(format!(
                "`{}` is not an ancestor of `{}`",
                base, tip
            )));
        }

        state
            .between(base, tip)
            .into_iter()
            .map(|id| {
                let commit = state.commit(&id)?;
                Ok(CommitInfo {
                    parents: commit.parents.clone(),
                    message: commit.message.clone(),
                    author_email: AUTHOR_EMAIL.to_string(),
                    authored_at: commit.authored_at,
                    id,
                })
            })
            .collect()
    }

    fn replay_commit(&self, commit: &str, parent: &str, message: &str) -> ReviewResult<String> {
        self.state().replay(commit, parent, Some(message))
    }

    fn move_branch(&self, branch: &str, new_tip: &str, expected: &str) -> ReviewResult<()> {
        let mut state = self.state();
        if state.refs.get(branch).map(String::as_str) != Some(expected) {
            return Err(ReviewError::Git2(git2::Error::from_str(&format!(
                "`{}` moved concurrently",
                branch
            ))));
        }
        state.refs.insert(branch.to_string(), new_tip.to_string());
        Ok(())
    }

    fn fetch_branch(&self, remote: &str, branch: &str) -> ReviewResult<()> {
        let tip = self.remote.tip(branch);
        if let Some(tip) = tip {
            self.state()
                .refs
                .insert(format!("{}/{}", remote, branch), tip);
        }
        Ok(())
    }

    fn force_push(
        &self,
        _remote: &str,
        hash: &str,
        branch: &str,
        expected: Option<&str>,
    ) -> ReviewResult<()> {
        self.remote.push(branch, hash, expected)
    }

    fn rebase_branch(&self, branch: &str, onto: &str) -> ReviewResult<()> {
        let mut state = self.state();
        let tip = state.resolve(branch)?;
        let base = state.merge_base(&tip, onto).unwrap_or_default();
        let upstream = state
            .between(&base, onto)
            .into_iter()
            .map(|id| {
                let commit = &state.commits[&id];
                (commit.tree.clone(), commit.message.clone())
            })
            .collect::<HashSet<_>>();

        let mut parent = onto.to_string();
        for id in state.between(&base, &tip) {
            let commit = state.commit(&id)?.clone();
            if upstream.contains(&(commit.tree.clone(), commit.message.clone())) {
                continue;
            }
            if state.conflict_tree.as_ref() == Some(&commit.tree) {
                state.in_progress = true;
                return Err(ReviewError::RebaseConflict(id));
            }
            parent = state.replay(&id, &parent, None)?;
        }

        state.refs.insert(branch.to_string(), parent);
        Ok(())
    }

    fn has_conflicts(&self) -> ReviewResult<bool> {
        Ok(self.state().in_progress)
    }

    fn commit_patch(&self, commit: &str) -> ReviewResult<String> {
        Ok(format!("+{}\n", self.state().commit(commit)?.tree))
    }
}
