use crate::{BlobId, Error, Result, Token, CREATION_DATE_FORMAT};
use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Position of a node inside a folder tree, as child indices from the root.
pub type NodePath = Vec<usize>;

/// A leaf of the backup tree: one local file, or the base path of a
/// multi-volume archive whose parts are `{base}.001`, `{base}.002`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUpload {
    pub name: String,
    /// Blob ids in ascending part order.
    #[serde(default)]
    pub upload_id: Vec<BlobId>,
    #[serde(default)]
    pub absolute_path: Option<PathBuf>,
    #[serde(default)]
    pub is_split: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_count: Option<usize>,
}

impl FileUpload {
    pub fn single(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            upload_id: Vec::new(),
            absolute_path: Some(path),
            is_split: false,
            part_count: Some(1),
        }
    }

    pub fn split(name: impl Into<String>, base: PathBuf, part_count: usize) -> Self {
        Self {
            name: name.into(),
            upload_id: Vec::new(),
            absolute_path: Some(base),
            is_split: true,
            part_count: Some(part_count),
        }
    }

    /// Number of blobs a complete upload of this file consists of, when known.
    pub fn expected_parts(&self) -> Option<usize> {
        match self.part_count {
            Some(count) => Some(count),
            None if !self.is_split => Some(1),
            None => None,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.expected_parts()
            .is_some_and(|expected| expected > 0 && self.upload_id.len() == expected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Folder,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Folder => write!(f, "folder"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    File(FileUpload),
    Folder(FolderUpload),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::File(file) => &file.name,
            Node::Folder(folder) => &folder.name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::File(_) => NodeKind::File,
            Node::Folder(_) => NodeKind::Folder,
        }
    }

    pub fn as_file(&self) -> Option<&FileUpload> {
        match self {
            Node::File(file) => Some(file),
            Node::Folder(_) => None,
        }
    }

    pub fn as_folder(&self) -> Option<&FolderUpload> {
        match self {
            Node::Folder(folder) => Some(folder),
            Node::File(_) => None,
        }
    }
}

impl From<FileUpload> for Node {
    fn from(file: FileUpload) -> Self {
        Node::File(file)
    }
}

impl From<FolderUpload> for Node {
    fn from(folder: FolderUpload) -> Self {
        Node::Folder(folder)
    }
}

/// A node visited by [`FolderUpload::entries`].
#[derive(Debug)]
pub struct Entry<'a> {
    pub path: NodePath,
    /// Filesystem path relative to the folder the walk started from.
    pub relative: PathBuf,
    pub node: &'a Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderUpload {
    pub name: String,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl FolderUpload {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn contains(&self, name: &str, kind: NodeKind) -> bool {
        self.children
            .iter()
            .any(|child| child.kind() == kind && child.name() == name)
    }

    /// Appends a child, refusing a second child with the same name and kind.
    /// Returns the index of the new child.
    pub fn add_child(&mut self, node: impl Into<Node>) -> Result<usize> {
        let node = node.into();
        if self.contains(node.name(), node.kind()) {
            return Err(Error::DuplicateEntry {
                kind: node.kind().to_string(),
                name: node.name().to_string(),
            });
        }
        self.children.push(node);
        Ok(self.children.len() - 1)
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (last, parents) = path.split_last()?;
        let mut folder = self;
        for &index in parents {
            folder = folder.children.get(index)?.as_folder()?;
        }
        folder.children.get(*last)
    }

    pub fn file_at(&self, path: &[usize]) -> Option<&FileUpload> {
        self.node_at(path)?.as_file()
    }

    pub fn file_at_mut(&mut self, path: &[usize]) -> Option<&mut FileUpload> {
        let (last, parents) = path.split_last()?;
        match self.folder_at_mut(parents)?.children.get_mut(*last)? {
            Node::File(file) => Some(file),
            Node::Folder(_) => None,
        }
    }

    /// The folder at `path`; an empty path is this folder itself.
    pub fn folder_at_mut(&mut self, path: &[usize]) -> Option<&mut FolderUpload> {
        let mut folder = self;
        for &index in path {
            folder = match folder.children.get_mut(index)? {
                Node::Folder(child) => child,
                Node::File(_) => return None,
            };
        }
        Some(folder)
    }

    /// Depth-first pre-order walk, children in stored order.
    pub fn entries(&self) -> Vec<Entry<'_>> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodePath, PathBuf, &Node)> = self
            .children
            .iter()
            .enumerate()
            .rev()
            .map(|(index, node)| (vec![index], PathBuf::from(node.name()), node))
            .collect();

        while let Some((path, relative, node)) = stack.pop() {
            if let Node::Folder(folder) = node {
                for (index, child) in folder.children.iter().enumerate().rev() {
                    let mut child_path = path.clone();
                    child_path.push(index);
                    stack.push((child_path, relative.join(child.name()), child));
                }
            }
            out.push(Entry { path, relative, node });
        }

        out
    }

    /// Paths of every file leaf, in upload order.
    pub fn leaf_paths(&self) -> Vec<NodePath> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.node.kind() == NodeKind::File)
            .map(|entry| entry.path)
            .collect()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &FileUpload> {
        self.entries()
            .into_iter()
            .filter_map(|entry| entry.node.as_file())
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    pub fn uploaded_leaf_count(&self) -> usize {
        self.leaves().filter(|file| file.is_uploaded()).count()
    }
}

/// Top of one backup: the mirrored folder plus its identity and state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRootFolder {
    pub token: Token,
    #[serde(flatten)]
    pub folder: FolderUpload,
    #[serde(default)]
    pub uploaded: bool,
    #[serde(rename = "creatin_date", with = "creation_date")]
    pub created_at: NaiveDateTime,
}

impl BackupRootFolder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            folder: FolderUpload::new(name),
            uploaded: false,
            created_at: Local::now().naive_local().trunc_subsecs(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.folder.name
    }

    pub fn short_token(&self) -> String {
        self.token.chars().take(8).collect()
    }

    pub fn created_label(&self) -> String {
        self.created_at.format(CREATION_DATE_FORMAT).to_string()
    }

    /// Directory name a download of this backup is materialized under.
    pub fn display_name(&self) -> String {
        format!("{}_{}", self.folder.name, self.created_label())
    }

    pub fn is_fully_uploaded(&self) -> bool {
        self.folder.leaves().all(|file| file.is_uploaded())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} - {} ({}/{} files uploaded) at {}",
            self.short_token(),
            self.folder.name,
            self.folder.uploaded_leaf_count(),
            self.folder.leaf_count(),
            self.created_label()
        )
    }
}

mod creation_date {
    use crate::CREATION_DATE_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(CREATION_DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, CREATION_DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}
