mod client;

pub use client::{
    ApiErrorClass, Blob, Commit, Contents, EntryKind, GithubClient, GithubError, RemoteTree,
    Repository, RepositoryRef, Tree, TreeEntry, TreeItem,
};
