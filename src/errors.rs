/// gstack Error Types
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// A git subprocess failed outright
    #[error("git {command} failed: {stderr}")]
    GitCommand { command: String, stderr: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced stack does not exist
    #[error("Stack '{0}' not found")]
    StackNotFound(String),

    /// Referenced branch is not tracked
    #[error("Branch '{0}' is not tracked")]
    BranchNotFound(String),

    /// Duplicate stack creation
    #[error("Stack '{0}' already exists")]
    StackExists(String),

    /// Branch is already a member of the stack
    #[error("Branch '{branch}' already exists in stack '{stack}'")]
    AlreadyMember { stack: String, branch: String },

    /// Branch is not a member of the stack
    #[error("Branch '{branch}' does not exist in stack '{stack}'")]
    NotMember { stack: String, branch: String },

    /// Stack members cannot be placed in dependency order
    #[error("Stack '{stack}' cannot be ordered at branch '{branch}': {reason}")]
    Ordering {
        stack: String,
        branch: String,
        reason: String,
    },

    /// Repository corruption errors
    #[error("Repository corruption: {0}")]
    Corruption(String),

    /// A resolution action was requested but no restack is halted
    #[error("No restack in progress. Nothing to continue.")]
    NoRestackInProgress,

    /// A restack is halted and must be resolved first
    #[error("A restack of stack '{0}' is in progress. Resolve it with --continue, --skip or --abort.")]
    RestackInProgress(String),

    /// git reports that there is no rebase to resolve
    #[error("No rebase in progress for '{0}'")]
    NoRebaseInProgress(String),

    /// Rebase operation errors
    #[error("Rebase error: {0}")]
    Rebase(String),

    /// Hosting API errors
    #[error("Hosting error: {0}")]
    Hosting(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl StackError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        StackError::Config(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        StackError::Validation(msg.into())
    }

    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        StackError::Corruption(msg.into())
    }

    pub fn rebase<S: Into<String>>(msg: S) -> Self {
        StackError::Rebase(msg.into())
    }

    pub fn hosting<S: Into<String>>(msg: S) -> Self {
        StackError::Hosting(msg.into())
    }

    pub fn auth<S: Into<String>>(msg: S) -> Self {
        StackError::Auth(msg.into())
    }

    pub fn ordering<S: Into<String>>(stack: S, branch: S, reason: S) -> Self {
        StackError::Ordering {
            stack: stack.into(),
            branch: branch.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that indicate the persisted graph violates an invariant
    pub fn is_corruption(&self) -> bool {
        matches!(self, StackError::Ordering { .. } | StackError::Corruption(_))
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
