use gstack::config::{restack_state_file, state_file, Settings};
use gstack::git::rebase::ConflictKind;
use gstack::git::GitRepository;
use gstack::stack::{RestackManager, RestackReport, RestackState, StackService};
use gstack::storage::{Database, GraphRead};
use gstack::StackError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(dir: &Path, file: &str, content: &str, message: &str) {
    std::fs::write(dir.join(file), content).unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", message]);
}

fn is_ancestor(dir: &Path, ancestor: &str, descendant: &str) -> bool {
    Command::new("git")
        .args(["merge-base", "--is-ancestor", ancestor, descendant])
        .current_dir(dir)
        .status()
        .unwrap()
        .success()
}

struct Fixture {
    dir: TempDir,
    repo: GitRepository,
    db: Database,
    progress: PathBuf,
}

impl Fixture {
    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn manager(&self) -> RestackManager<'_, GitRepository> {
        RestackManager::new(&self.db, &self.repo, &self.progress)
    }
}

/// main <- feat-a <- feat-b, each with one commit, in stack "feature"
fn stacked_repo(a_file: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    let path = dir.path();
    git(path, &["init", "-q"]);
    git(path, &["config", "user.name", "Test User"]);
    git(path, &["config", "user.email", "test@example.com"]);
    commit_file(path, "shared.txt", "base\n", "Initial commit");
    git(path, &["branch", "-M", "main"]);

    let repo = GitRepository::open(path).unwrap();
    let (db, existed) = Database::open(&state_file(repo.git_dir())).unwrap();
    assert!(!existed);
    let progress = restack_state_file(repo.git_dir());

    let settings = Settings::default();
    let service = StackService::new(&db, &repo, &settings);
    service.create_stack("feature", None).unwrap();
    service.create_branch("feat-a").unwrap();
    commit_file(path, a_file, "from a\n", "Add a");
    service.create_branch("feat-b").unwrap();
    commit_file(path, "b.txt", "from b\n", "Add b");

    Fixture {
        dir,
        repo,
        db,
        progress,
    }
}

fn move_main(fixture: &Fixture) {
    let path = fixture.path();
    git(path, &["checkout", "-q", "main"]);
    commit_file(path, "shared.txt", "moved on main\n", "Move main");
    git(path, &["checkout", "-q", "feat-b"]);
}

fn recorded_parent_head(db: &Database, branch: &str) -> Option<String> {
    db.begin_read()
        .branch(branch)
        .and_then(|b| b.parent.head().map(str::to_string))
}

#[test]
fn test_restack_moves_whole_stack_onto_new_trunk() {
    let fixture = stacked_repo("a.txt");
    move_main(&fixture);
    let path = fixture.path();

    let report = fixture.manager().restack("feature").unwrap();
    let RestackReport::Completed(summary) = report else {
        panic!("restack halted unexpectedly");
    };
    assert_eq!(summary.restacked, vec!["feat-a", "feat-b"]);

    assert!(is_ancestor(path, "main", "feat-a"));
    assert!(is_ancestor(path, "feat-a", "feat-b"));
    assert_eq!(
        recorded_parent_head(&fixture.db, "feat-a"),
        Some(git(path, &["rev-parse", "main"]))
    );
    assert_eq!(
        recorded_parent_head(&fixture.db, "feat-b"),
        Some(git(path, &["rev-parse", "feat-a"]))
    );
    assert_eq!(fixture.repo.get_current_branch().unwrap(), "feat-b");
    assert!(!RestackState::exists(&fixture.progress));
}

#[test]
fn test_second_restack_is_a_no_op() {
    let fixture = stacked_repo("a.txt");
    move_main(&fixture);
    fixture.manager().restack("feature").unwrap();

    let state_before = std::fs::read_to_string(fixture.db.path()).unwrap();
    let head_before = git(fixture.path(), &["rev-parse", "feat-b"]);

    let report = fixture.manager().restack("feature").unwrap();
    let RestackReport::Completed(summary) = report else {
        panic!("restack halted unexpectedly");
    };
    assert!(summary.restacked.is_empty());
    assert_eq!(summary.unchanged, vec!["feat-a", "feat-b"]);
    assert_eq!(std::fs::read_to_string(fixture.db.path()).unwrap(), state_before);
    assert_eq!(git(fixture.path(), &["rev-parse", "feat-b"]), head_before);
}

#[test]
fn test_conflict_halts_then_continue_finishes() {
    // feat-a edits the file main also changes
    let fixture = stacked_repo("shared.txt");
    move_main(&fixture);
    let path = fixture.path();
    let old_a_parent = recorded_parent_head(&fixture.db, "feat-a");

    let report = fixture.manager().restack("feature").unwrap();
    let RestackReport::Halted(conflict) = report else {
        panic!("expected a conflict");
    };
    assert_eq!(conflict.branch, "feat-a");
    assert_eq!(conflict.kind, ConflictKind::Merge);
    assert!(conflict
        .headline
        .as_deref()
        .is_some_and(|h| h.starts_with("could not apply")));
    assert!(fixture.repo.is_rebase_in_progress());
    assert_eq!(recorded_parent_head(&fixture.db, "feat-a"), old_a_parent);

    let progress = RestackState::load(&fixture.progress).unwrap();
    assert_eq!(progress.halted_branch, "feat-a");
    assert_eq!(progress.original_branch, "feat-b");

    // A new restack must not start over a halted one
    assert!(matches!(
        fixture.manager().restack("feature"),
        Err(StackError::RestackInProgress(_))
    ));

    std::fs::write(path.join("shared.txt"), "resolved\n").unwrap();
    git(path, &["add", "shared.txt"]);

    let report = fixture.manager().continue_restack().unwrap();
    let RestackReport::Completed(summary) = report else {
        panic!("continue halted unexpectedly");
    };
    assert_eq!(summary.restacked, vec!["feat-a", "feat-b"]);
    assert!(is_ancestor(path, "main", "feat-a"));
    assert!(is_ancestor(path, "feat-a", "feat-b"));
    assert!(!fixture.repo.is_rebase_in_progress());
    assert!(!RestackState::exists(&fixture.progress));
    assert_eq!(fixture.repo.get_current_branch().unwrap(), "feat-b");
}

#[test]
fn test_abort_leaves_branch_and_record_unchanged() {
    let fixture = stacked_repo("shared.txt");
    move_main(&fixture);
    let path = fixture.path();
    let a_before = git(path, &["rev-parse", "feat-a"]);
    let recorded_before = recorded_parent_head(&fixture.db, "feat-a");

    let report = fixture.manager().restack("feature").unwrap();
    assert!(matches!(report, RestackReport::Halted(_)));

    let state = fixture.manager().abort_restack().unwrap();
    assert_eq!(state.halted_branch, "feat-a");
    assert_eq!(git(path, &["rev-parse", "feat-a"]), a_before);
    assert_eq!(recorded_parent_head(&fixture.db, "feat-a"), recorded_before);
    assert!(!fixture.repo.is_rebase_in_progress());
    assert_eq!(fixture.repo.get_current_branch().unwrap(), "feat-b");

    assert!(matches!(
        fixture.manager().continue_restack(),
        Err(StackError::NoRestackInProgress)
    ));
}

#[test]
fn test_state_survives_reopen_after_restack() {
    let fixture = stacked_repo("a.txt");
    move_main(&fixture);
    fixture.manager().restack("feature").unwrap();

    let (reopened, existed) = Database::open(fixture.db.path()).unwrap();
    assert!(existed);
    let read = reopened.begin_read();
    let names: Vec<&str> = read
        .ordered_stack_branches("feature")
        .unwrap()
        .iter()
        .map(|b| b.name.as_str())
        .collect();
    assert_eq!(names, vec!["feat-a", "feat-b"]);
    assert_eq!(
        read.branch("feat-b").unwrap().parent.head(),
        Some(git(fixture.path(), &["rev-parse", "feat-a"]).as_str())
    );
}
