mod mutations;
mod overlay;

pub use mutations::{
    StageOutcome, Stamp, create_file, delete_file, discard_staged_change, edit_file,
    list_staged_changes, plan_create, plan_delete, plan_edit, plan_rename, rename_file,
    rename_folder,
};
pub use overlay::{
    authoritative, content_ref, effective_file, effective_tree, get_effective_file,
    list_effective_tree, overlay_committed, overlay_staged,
};
