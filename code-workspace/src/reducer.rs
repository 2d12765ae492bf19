use std::collections::HashSet;

use crate::{
    action::Action,
    state::{ExecutionResult, File, WorkspaceState},
};

/// Apply one action to a state, producing the next state.
///
/// Pure and total: the same `(state, action)` pair always yields the same
/// result. Besides the plain field writes it keeps two invariants:
/// * file ids stay unique (`SetFiles` keeps the first occurrence of an id)
/// * `current_file` and `rename.file_to_rename` never point at a missing file
pub fn reduce(state: &WorkspaceState, action: &Action) -> WorkspaceState {
    let mut next = state.clone();

    match action {
        Action::SetCode(code) => next.code = code.clone(),
        Action::SetLanguage(language) => next.language = language.clone(),
        Action::SetFiles(files) => {
            next.files = dedup_by_id(files);
            if !references_existing(&next.files, next.current_file.as_deref()) {
                next.current_file = None;
            }
            if !references_existing(&next.files, next.rename.file_to_rename.as_deref()) {
                next.rename.file_to_rename = None;
            }
        }
        Action::SetCurrentFile(id) => {
            if references_existing(&next.files, id.as_deref()) {
                next.current_file = id.clone();
            }
        }
        Action::SetRenaming(is_renaming) => next.rename.is_renaming = *is_renaming,
        Action::SetNewFileName(name) => next.rename.new_file_name = name.clone(),
        Action::SetFileToRename(id) => {
            if references_existing(&next.files, id.as_deref()) {
                next.rename.file_to_rename = id.clone();
            }
        }
        Action::SetLoading(loading) => {
            // entering Loading always starts from an empty result
            if *loading {
                next.result = ExecutionResult::default();
            }
            next.loading = *loading;
        }
        Action::SetResult(result) => next.result = result.clone(),
    }

    next
}

/// Fold a recorded action log over an initial state.
pub fn replay<'a>(
    initial: &WorkspaceState,
    actions: impl IntoIterator<Item = &'a Action>,
) -> WorkspaceState {
    actions
        .into_iter()
        .fold(initial.clone(), |state, action| reduce(&state, action))
}

fn dedup_by_id(files: &[File]) -> Vec<File> {
    let mut seen = HashSet::new();
    files
        .iter()
        .filter(|file| seen.insert(file.id.as_str()))
        .cloned()
        .collect()
}

// `None` is always a valid reference
fn references_existing(files: &[File], id: Option<&str>) -> bool {
    match id {
        Some(id) => files.iter().any(|file| file.id == id),
        None => true,
    }
}
