//! Repository preparation.

mod cloner;

pub use cloner::{
    open_local_repository, owner_from_url, prepare_repository, repository_name_from_url,
    CloneResult,
};
