use std::collections::HashSet;
use std::vec;

use log::debug;

use crate::efs::{Dentry, Filesystem, Inode, InodeNo};
use crate::error::Result;
use crate::image::ByteStore;

/// A file reached by the walk, with its path relative to the root directory. The path is built from the raw names on
/// disk, which IRIX does not require to be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: Vec<u8>,
    pub inode: Inode,
}

struct DirCursor {
    path: Vec<u8>,
    dentries: vec::IntoIter<Dentry>,
}

/// Pre-order iterator over all files below a directory, in the order of their dentries on disk. The starting directory
/// itself is not returned, neither are `.` and `..`.
///
/// Every directory is expanded at most once, even if it is reachable through several dentries. After the first error,
/// the iterator returns that error and then ends.
pub struct Walker<'a, S: ByteStore> {
    fs: &'a Filesystem<S>,
    /// The directory returned last, which is expanded on the next call
    pending_dir: Option<(Inode, Vec<u8>)>,
    stack: Vec<DirCursor>,
    expanded: HashSet<InodeNo>,
    failed: bool,
}

impl<'a, S: ByteStore> Walker<'a, S> {
    pub fn new(fs: &'a Filesystem<S>, root: Inode) -> Self {
        Self {
            fs,
            pending_dir: Some((root, Vec::new())),
            stack: Vec::new(),
            expanded: HashSet::new(),
            failed: false,
        }
    }

    fn expand(&mut self, dir: Inode, path: Vec<u8>) -> Result<()> {
        if !self.expanded.insert(dir.number) {
            debug!("not descending into {:?} again (inode {})", String::from_utf8_lossy(&path), dir.number);
            return Ok(());
        }
        let dentries = self.fs.read_dir(&dir)?;
        debug!(
            "entering {:?} (inode {}, {} dentries)",
            String::from_utf8_lossy(&path),
            dir.number,
            dentries.len()
        );
        self.stack.push(DirCursor { path, dentries: dentries.into_iter() });
        Ok(())
    }

    fn fail<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.failed = true;
        }
        result
    }
}

impl<'a, S: ByteStore> Iterator for Walker<'a, S> {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some((dir, path)) = self.pending_dir.take() {
            let result = self.expand(dir, path);
            if let Err(err) = self.fail(result) {
                return Some(Err(err));
            }
        }

        loop {
            let cursor = self.stack.last_mut()?;
            let dentry = match cursor.dentries.next() {
                Some(dentry) => dentry,
                None => {
                    self.stack.pop();
                    continue;
                }
            };
            if dentry.is_dot_dir() {
                continue;
            }

            let path = join_path(&cursor.path, &dentry.name);
            let result = self.fs.inode(dentry.inode_no);
            let inode = match self.fail(result) {
                Ok(inode) => inode,
                Err(err) => return Some(Err(err)),
            };
            if inode.is_dir() {
                self.pending_dir = Some((inode.clone(), path.clone()));
            }
            return Some(Ok(WalkEntry { path, inode }));
        }
    }
}

fn join_path(parent: &[u8], name: &[u8]) -> Vec<u8> {
    let mut path = Vec::with_capacity(parent.len() + 1 + name.len());
    if !parent.is_empty() {
        path.extend_from_slice(parent);
        path.push(b'/');
    }
    path.extend_from_slice(name);
    path
}

impl<S: ByteStore> Filesystem<S> {
    /// Walks the whole filesystem, starting at the root directory.
    pub fn walk(&self) -> Result<Walker<'_, S>> {
        Ok(Walker::new(self, self.root_inode()?))
    }
}
