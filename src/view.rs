//! Denormalized, sorted view of entries and their notes.

use crate::types::{AssetRef, Entry, EntryId, Note, NoteId, Timestamp};
use std::cmp::Ordering;

/// A note as presented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoteView {
    pub id: NoteId,
    pub text: String,
    pub created_at: Option<Timestamp>,
}

/// An entry with its notes, as presented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryView {
    pub id: EntryId,
    pub title: String,
    pub body: Option<String>,
    pub asset_ref: AssetRef,
    pub created_at: Option<Timestamp>,
    /// Oldest first.
    pub notes: Vec<NoteView>,
}

/// Builds [`EntryView`] lists from one completed snapshot batch.
pub struct ViewAssembler;

impl ViewAssembler {
    /// Sort entries newest first and each entry's notes oldest first.
    ///
    /// Pure: the same batch always yields the same view. An unresolved
    /// `created_at` counts as newer than any resolved one. Ties fall back to
    /// id order.
    pub fn assemble(batch: Vec<(Entry, Vec<Note>)>) -> Vec<EntryView> {
        let mut views: Vec<EntryView> = batch
            .into_iter()
            .map(|(entry, notes)| {
                let mut notes: Vec<NoteView> = notes
                    .into_iter()
                    .map(|note| NoteView {
                        id: note.id,
                        text: note.text,
                        created_at: note.created_at,
                    })
                    .collect();
                notes.sort_by(|a, b| {
                    created_order(a.created_at, b.created_at).then_with(|| a.id.cmp(&b.id))
                });

                EntryView {
                    id: entry.id,
                    title: entry.title,
                    body: entry.body,
                    asset_ref: entry.asset_ref,
                    created_at: entry.created_at,
                    notes,
                }
            })
            .collect();

        views.sort_by(|a, b| {
            created_order(b.created_at, a.created_at).then_with(|| a.id.cmp(&b.id))
        });
        views
    }
}

/// Ascending creation order, pending timestamps last.
fn created_order(a: Option<Timestamp>, b: Option<Timestamp>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
