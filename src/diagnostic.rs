use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CacheRead,
    Oracle,
    Scoring,
    Persist,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Stage::CacheRead => "cache read",
            Stage::Oracle => "oracle",
            Stage::Scoring => "relevance scoring",
            Stage::Persist => "persist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} failed: {message}", .stage.label())]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.stage == Stage::Oracle
    }
}
