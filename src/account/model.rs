//-
// Copyright (c) 2020, 2022, 2023, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::convert::{TryFrom, TryInto};
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs start at 1 and increase monotonically as messages are added to the
/// mailbox. UIDs are never reused within one UID validity epoch.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

// This isn't a useful default implementation, but is here so that things
// containing SeqRange<ID> can still derive Default.
impl Default for Uid {
    fn default() -> Self {
        Uid::MIN
    }
}

impl Uid {
    // Unsafe because new() isn't const for some reason
    pub const MIN: Self = unsafe { Uid(NonZeroU32::new_unchecked(1)) };
    /// The largest UID that can be assigned to a message.
    ///
    /// This is one less than the largest 32-bit integer so that the UIDNEXT
    /// of a mailbox is always representable, even once it is full.
    pub const MAX: Self =
        unsafe { Uid(NonZeroU32::new_unchecked(u32::MAX - 1)) };
    /// The UIDNEXT of a mailbox whose UID space is exhausted.
    ///
    /// Never assigned to a message.
    pub const END: Self = unsafe { Uid(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid).filter(|&u| u <= Uid::MAX)
    }

    /// Returns the UID after this one, or `None` if this is `MAX` (or `END`).
    pub fn next(self) -> Option<Self> {
        if self >= Uid::MAX {
            None
        } else {
            Uid::of(self.0.get() + 1)
        }
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl TryFrom<u32> for Uid {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<Uid> for u32 {
    fn from(uid: Uid) -> u32 {
        uid.0.get()
    }
}

/// The 1-based position of a message within one session's view of the
/// mailbox.
///
/// Unlike a `Uid`, a sequence number is not stable: expunging a message
/// shifts every later message down by one, but only once the session has
/// been told about the expunge.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Seqnum(pub NonZeroU32);

// This isn't a useful default implementation, but is here so that things
// containing SeqRange<ID> can still derive Default.
impl Default for Seqnum {
    fn default() -> Self {
        Seqnum::MIN
    }
}

impl Seqnum {
    // Unsafe because new() isn't const for some reason
    pub const MIN: Self = unsafe { Seqnum(NonZeroU32::new_unchecked(1)) };
    pub const MAX: Self =
        unsafe { Seqnum(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(seqnum: u32) -> Option<Self> {
        NonZeroU32::new(seqnum).map(Seqnum)
    }

    #[cfg(test)]
    pub fn u(seqnum: u32) -> Self {
        Seqnum::of(seqnum).unwrap()
    }

    pub fn to_index(self) -> usize {
        self.0.get() as usize - 1
    }

    /// Convert a 0-based index into a sequence number.
    ///
    /// Returns `None` if the index is not representable, which cannot happen
    /// for indices into a mailbox, since a mailbox never holds more than
    /// `u32::MAX` messages.
    pub fn from_index(ix: usize) -> Option<Self> {
        ix.checked_add(1)
            .and_then(|s| s.try_into().ok())
            .and_then(Seqnum::of)
    }
}

impl TryFrom<u32> for Seqnum {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<Seqnum> for u32 {
    fn from(seqnum: Seqnum) -> u32 {
        seqnum.0.get()
    }
}

impl fmt::Debug for Seqnum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Seqnum({})", self.0.get())
    }
}

/// A "sequence set range" of sequence numbers or UIDs.
///
/// Internally, this is maintained as a minimal sorted set of inclusive ranges.
/// It does not maintain information on the original fragmentation, ordering,
/// or duplication.
///
/// The `Display` format puts this into minimal IMAP wire format. IMAP has no
/// way to represent an empty sequence set; `Display` produces an empty string
/// in that case.
#[derive(Clone, PartialEq, Eq)]
pub struct SeqRange<T> {
    parts: BTreeMap<u32, u32>,
    _t: PhantomData<T>,
}

impl<T> SeqRange<T> {
    /// Create a new, empty range.
    pub fn new() -> Self {
        SeqRange {
            parts: BTreeMap::new(),
            _t: PhantomData,
        }
    }

    /// Return whether this range is empty.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl<T: TryFrom<u32> + Into<u32> + PartialOrd> SeqRange<T> {
    /// Create a range containing just the given item.
    pub fn just(item: T) -> Self {
        let mut this = SeqRange::new();
        this.insert(item);
        this
    }

    /// Create a range containing just a single, simple range.
    pub fn range(start: T, end: T) -> Self {
        let mut this = SeqRange::new();
        this.insert_range(start, end);
        this
    }

    /// Insert a single item.
    pub fn insert(&mut self, item: T) {
        let item: u32 = item.into();
        self.insert_raw(item, item);
    }

    /// Insert the given inclusive range, whose endpoints may be in either
    /// order.
    pub fn insert_range(&mut self, a: T, b: T) {
        let (a, b): (u32, u32) = (a.into(), b.into());
        self.insert_raw(a.min(b), a.max(b));
    }

    fn insert_raw(&mut self, start_incl: u32, mut end_incl: u32) {
        // Fuse any later ranges that overlap or abut the new one.
        loop {
            let following = self
                .parts
                .range((Excluded(start_incl), Unbounded))
                .next()
                .map(|(&start, &end)| (start, end));

            match following {
                Some((following_start, following_end))
                    if following_start - 1 <= end_incl =>
                {
                    end_incl = end_incl.max(following_end);
                    self.parts.remove(&following_start);
                }
                _ => break,
            }
        }

        let preceding = self
            .parts
            .range((Unbounded, Included(start_incl)))
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((preceding_start, preceding_end)) = preceding {
            if preceding_end.saturating_add(1) >= start_incl {
                self.parts
                    .insert(preceding_start, end_incl.max(preceding_end));
                return;
            }
        }

        self.parts.insert(start_incl, end_incl);
    }

    /// Return whether the given item is present in this set.
    pub fn contains(&self, v: T) -> bool {
        let v: u32 = v.into();
        self.parts
            .range(..=v)
            .next_back()
            .filter(|&(_, &end)| end >= v)
            .is_some()
    }

    /// Return an iterator to the items in this set.
    ///
    /// Invalid items and items greater than `max` are silently excluded.
    ///
    /// Items are delivered in strictly ascending order.
    pub fn items<'a>(
        &'a self,
        max: impl Into<u32>,
    ) -> impl Iterator<Item = T> + 'a {
        let max: u32 = max.into();
        self.parts
            .iter()
            .map(|(&start, &end)| (start, end))
            .filter(move |&(start, _)| start <= max)
            .flat_map(move |(start, end)| start..=end.min(max))
            .filter_map(|v| T::try_from(v).ok())
    }

    /// Parse the IMAP-format of the sequence set.
    ///
    /// `splat` is used as the value of elements which specify `*`.
    pub fn parse(raw: &str, splat: T) -> Option<Self> {
        fn do_parse(r: &str, splat: u32) -> Option<u32> {
            if "*" == r {
                Some(splat)
            } else if !r.is_empty() && r.bytes().all(|b| b.is_ascii_digit()) {
                r.parse().ok().filter(|&v| v > 0)
            } else {
                None
            }
        }

        let splat = splat.into();

        let mut this = Self::new();
        for part in raw.split(',') {
            let mut subs = part.split(':');
            match (subs.next(), subs.next(), subs.next()) {
                (Some(only), None, None) => {
                    let only = do_parse(only, splat)?;
                    this.insert_raw(only, only);
                }
                (Some(start), Some(end), None) => {
                    let start = do_parse(start, splat)?;
                    let end = do_parse(end, splat)?;
                    // RFC 3501 allows the endpoints to be in either order
                    this.insert_raw(start.min(end), end.max(start));
                }
                _ => return None,
            }
        }

        Some(this)
    }

    /// Return the total size of the sequence set.
    pub fn len(&self) -> usize {
        self.parts
            .iter()
            .map(|(&start, &end)| (end - start) as usize + 1)
            .sum()
    }

    /// Return the maximum value in this sequence set, raw.
    pub fn max(&self) -> Option<u32> {
        self.parts.values().next_back().copied()
    }
}

impl<T> fmt::Display for SeqRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, (&start, &end)) in self.parts.iter().enumerate() {
            let delim = if 0 == ix { "" } else { "," };

            if start == end {
                write!(f, "{}{}", delim, start)?;
            } else {
                write!(f, "{}{}:{}", delim, start, end)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SeqRange<Seqnum> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Seqnum {}]", self)
    }
}

impl fmt::Debug for SeqRange<Uid> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Uid {}]", self)
    }
}

impl<T> Default for SeqRange<T> {
    fn default() -> Self {
        SeqRange::new()
    }
}

/// A sequence set as sent by a client, before `*` has been resolved.
///
/// `*` can only be resolved against one session's view of the mailbox at the
/// moment the set is used, so the set is kept in its raw form until then.
#[derive(Clone, PartialEq, Eq)]
pub struct SequenceSet {
    raw: String,
    uid: bool,
}

impl SequenceSet {
    /// Validate `raw` as a sequence set. If `uid` is true, the numbers are
    /// UIDs, otherwise sequence numbers.
    pub fn parse(raw: &str, uid: bool) -> Option<Self> {
        SeqRange::<u32>::parse(raw, 1)?;
        Some(SequenceSet {
            raw: raw.to_owned(),
            uid,
        })
    }

    /// A sequence set of sequence numbers.
    pub fn seqnums(raw: &str) -> Option<Self> {
        Self::parse(raw, false)
    }

    /// A sequence set of UIDs.
    pub fn uids(raw: &str) -> Option<Self> {
        Self::parse(raw, true)
    }

    pub fn is_uid(&self) -> bool {
        self.uid
    }

    /// Resolve this set with `*` standing for `splat`.
    pub fn resolve<T: TryFrom<u32> + Into<u32> + PartialOrd>(
        &self,
        splat: T,
    ) -> SeqRange<T> {
        // Validated in `parse()`
        SeqRange::parse(&self.raw, splat).unwrap_or_default()
    }
}

impl fmt::Debug for SequenceSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.uid {
            write!(f, "[UID {}]", self.raw)
        } else {
            write!(f, "[{}]", self.raw)
        }
    }
}

/// A message flag.
///
/// System flags are represented as top-level enum values. Keywords are in the
/// `Keyword` case.
///
/// `\Recent` is represented here so that the flags a session sees can be
/// handled as one set, but it is never a *permanent* flag: it only ever lives
/// in a session's `SessionFlags` overlay, and is stripped from anything
/// written to a `Message`'s permanent flags.
///
/// The `Display` format of this type is the exact string value that would be
/// sent over the wire. `FromStr` does the reverse conversion, and also
/// understands non-standard casing of the system flags.
///
/// Keywords compare and order ASCII-case-insensitively.
#[derive(Clone, Serialize, Deserialize)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Recent,
    Keyword(String),
}

impl Flag {
    /// The system flags which may be stored permanently.
    pub const SYSTEM: [Flag; 5] = [
        Flag::Answered,
        Flag::Deleted,
        Flag::Draft,
        Flag::Flagged,
        Flag::Seen,
    ];

    /// Whether this flag only exists within a session.
    pub fn is_session_only(&self) -> bool {
        match *self {
            Flag::Recent => true,
            _ => false,
        }
    }

    fn rank(&self) -> u8 {
        match *self {
            Flag::Answered => 0,
            Flag::Deleted => 1,
            Flag::Draft => 2,
            Flag::Flagged => 3,
            Flag::Seen => 4,
            Flag::Recent => 5,
            Flag::Keyword(_) => 6,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Recent => write!(f, "\\Recent"),
            Flag::Keyword(ref kw) => write!(f, "{}", kw),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if s.eq_ignore_ascii_case("\\recent") {
            Ok(Flag::Recent)
        } else if s.starts_with('\\') {
            Err(Error::NxFlag)
        } else if !s.is_empty() && s.bytes().all(is_atom_char) {
            Ok(Flag::Keyword(s.to_owned()))
        } else {
            Err(Error::UnsafeName)
        }
    }
}

fn is_atom_char(ch: u8) -> bool {
    match ch {
        0..=b' ' => false,
        127..=255 => false,
        b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']' => false,
        _ => true,
    }
}

impl Ord for Flag {
    fn cmp(&self, other: &Flag) -> Ordering {
        match (self, other) {
            // Apparently the expectation is that keywords are
            // case-insensitive, despite RFC 3501 not requiring that. We only
            // do ASCII case-insensitivity to limit the insanity.
            (&Flag::Keyword(ref a), &Flag::Keyword(ref b)) => a
                .bytes()
                .map(|b| b.to_ascii_lowercase())
                .cmp(b.bytes().map(|b| b.to_ascii_lowercase())),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Flag {
    fn partial_cmp(&self, other: &Flag) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Flag {
    fn eq(&self, other: &Flag) -> bool {
        Ordering::Equal == self.cmp(other)
    }
}

impl Eq for Flag {}

/// How much of a message a caller needs.
///
/// Loading content means reading and parsing the raw message, so callers
/// only interested in UIDs and flags should ask for `Metadata`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchRequirement {
    Metadata,
    Content,
}

/// Attributes reported for mailboxes in a listing.
///
/// This includes the RFC 6154 special-use markers.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum MailboxAttribute {
    // RFC 3501
    Noinferiors,
    // RFC 3348
    HasChildren,
    HasNoChildren,
    // RFC 5258
    Subscribed,
    // RFC 6154
    Archive,
    Drafts,
    Junk,
    Sent,
    Trash,
}

impl MailboxAttribute {
    pub fn name(&self) -> &'static str {
        match *self {
            MailboxAttribute::Noinferiors => "\\Noinferiors",
            MailboxAttribute::HasChildren => "\\HasChildren",
            MailboxAttribute::HasNoChildren => "\\HasNoChildren",
            MailboxAttribute::Subscribed => "\\Subscribed",
            MailboxAttribute::Archive => "\\Archive",
            MailboxAttribute::Drafts => "\\Drafts",
            MailboxAttribute::Junk => "\\Junk",
            MailboxAttribute::Sent => "\\Sent",
            MailboxAttribute::Trash => "\\Trash",
        }
    }

    /// The special-use attribute conventionally implied by a top-level
    /// mailbox name, if any.
    pub fn special_use_for(name: &str) -> Option<Self> {
        match name {
            "Archive" => Some(MailboxAttribute::Archive),
            "Drafts" => Some(MailboxAttribute::Drafts),
            "Sent" => Some(MailboxAttribute::Sent),
            "Spam" | "Junk" => Some(MailboxAttribute::Junk),
            "Trash" => Some(MailboxAttribute::Trash),
            _ => None,
        }
    }
}
