mod card;
mod dirty;
mod ids;
mod set;
mod state;
mod undo;

pub use ids::{CardId, ParseIdError, SetId, UndoSnapshotId};

pub use card::{Difficulty, Flashcard};
pub use dirty::{DirtyCard, DirtyItem, DirtyItemType};
pub use set::{DEFAULT_SET_TITLE, FlashcardSet, SetError};
pub use state::AppState;
pub use undo::{MAX_UNDO_HISTORY, UndoHistory, UndoOutcome, UndoSnapshot};
