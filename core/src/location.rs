//! Symbolic locations: paths from a resource root down to a sub-item.
//!
//! A Location is a reference-counted immutable singly-linked chain of
//! segments.  It renders to and parses from an IRI with a fragment where `/`
//! separates segments, bare integers are element indices, and string keys
//! that would otherwise look like integers (or start with `'`, or are
//! empty) get a `'` prefix.  Percent-encoding follows IRI rules.

use crate::error::{Error, Result};
use crate::resource::Resource;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;
use url::Url;

/// Characters that must be escaped inside a fragment segment.  `/` would
/// split the segment and `'` would change its interpretation.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'\'')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'{')
    .add(b'}')
    .add(b'|');

enum LocationData {
    Root(Resource),
    Key(Location, String),
    Index(Location, usize),
    /// A location that failed to be computed; the error surfaces when the
    /// location is rendered.
    Error(Error),
}

/// The empty Location is distinct from any rooted Location.
#[derive(Clone, Default)]
pub struct Location(Option<Rc<LocationData>>);

impl Location {
    pub fn empty() -> Location {
        Location(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn root(res: Resource) -> Location {
        Location(Some(Rc::new(LocationData::Root(res))))
    }

    /// Extend with an attribute key segment.
    pub fn child_key(&self, key: impl Into<String>) -> Location {
        Location(Some(Rc::new(LocationData::Key(
            self.clone(),
            key.into(),
        ))))
    }

    /// Extend with an element index segment.
    pub fn child_index(&self, index: usize) -> Location {
        Location(Some(Rc::new(LocationData::Index(self.clone(), index))))
    }

    /// A location whose computation failed; the error is deferred until
    /// the location is rendered or resolved.
    pub fn from_error(e: Error) -> Location {
        Location(Some(Rc::new(LocationData::Error(e))))
    }

    pub fn parent(&self) -> Option<&Location> {
        match self.0.as_deref() {
            Some(LocationData::Key(p, _))
            | Some(LocationData::Index(p, _)) => Some(p),
            _ => None,
        }
    }

    /// The key if the last segment is an attribute key.
    pub fn key(&self) -> Option<&str> {
        match self.0.as_deref() {
            Some(LocationData::Key(_, k)) => Some(k),
            _ => None,
        }
    }

    /// The index if the last segment is an element index.
    pub fn index(&self) -> Option<usize> {
        match self.0.as_deref() {
            Some(LocationData::Index(_, i)) => Some(*i),
            _ => None,
        }
    }

    /// The resource if this location is exactly a root.
    pub fn resource(&self) -> Option<&Resource> {
        match self.0.as_deref() {
            Some(LocationData::Root(r)) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self.0.as_deref() {
            Some(LocationData::Error(e)) => Some(e),
            _ => None,
        }
    }

    /// Walk up to the root and return its resource.
    pub fn root_resource(&self) -> Option<Resource> {
        let mut l = self;
        loop {
            match l.0.as_deref()? {
                LocationData::Root(r) => return Some(r.clone()),
                LocationData::Key(p, _) | LocationData::Index(p, _) => {
                    l = p
                }
                LocationData::Error(_) => return None,
            }
        }
    }

    /// Number of segments including the root.
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut l = self;
        while let Some(data) = l.0.as_deref() {
            n += 1;
            match data {
                LocationData::Key(p, _) | LocationData::Index(p, _) => {
                    l = p
                }
                _ => break,
            }
        }
        n
    }

    ///// IRI CONVERSION

    /// Parse a location from an IRI: the non-fragment part names the root
    /// resource, the fragment encodes the segments.
    pub fn from_iri(iri: &Url) -> Result<Location> {
        let mut base = iri.clone();
        base.set_fragment(None);
        let mut loc = Location::root(Resource::from_url(base)?);
        let fragment = iri.fragment().unwrap_or("");
        if fragment.is_empty() {
            return Ok(loc);
        }
        let mut segment_start = 0;
        let mut is_string = false;
        let bytes = fragment.as_bytes();
        for i in 0..=bytes.len() {
            match bytes.get(i) {
                None | Some(b'/') => {
                    let segment = &fragment[segment_start..i];
                    if is_string {
                        let key = percent_decode_str(segment)
                            .decode_utf8()
                            .map_err(|_| Error::InvalidResourceName {
                                name: iri.to_string(),
                            })?;
                        loc = loc.child_key(key.into_owned());
                    } else if segment.is_empty() {
                        // Empty segments are ignored
                    } else {
                        let index = segment.parse::<usize>().map_err(
                            |_| Error::InvalidResourceName {
                                name: iri.to_string(),
                            },
                        )?;
                        loc = loc.child_index(index);
                    }
                    segment_start = i + 1;
                    is_string = false;
                }
                Some(b'\'') => {
                    // A quote at the start of a segment is an escape that
                    // forces string interpretation
                    if i == segment_start && !is_string {
                        segment_start = i + 1;
                    }
                    is_string = true;
                }
                Some(c) if c.is_ascii_digit() => {}
                Some(_) => is_string = true,
            }
        }
        Ok(loc)
    }

    /// Render as an IRI.  Fails if the chain contains a deferred error.
    pub fn as_iri(&self) -> Result<Url> {
        let mut fragment = String::new();
        let mut l = self;
        loop {
            match l.0.as_deref() {
                None => {
                    let mut iri = Url::parse("ayu-anonymous:/").unwrap();
                    if !fragment.is_empty() {
                        iri.set_fragment(Some(&fragment));
                    }
                    return Ok(iri);
                }
                Some(LocationData::Root(res)) => {
                    let mut iri = res.name();
                    if !fragment.is_empty() {
                        iri.set_fragment(Some(&fragment));
                    }
                    return Ok(iri);
                }
                Some(LocationData::Key(p, key)) => {
                    let needs_quote = key.is_empty()
                        || key.starts_with('\'')
                        || key.starts_with(|c: char| c.is_ascii_digit());
                    let mut segment = String::new();
                    if needs_quote {
                        segment.push('\'');
                    }
                    segment
                        .push_str(&utf8_percent_encode(key, SEGMENT).to_string());
                    prepend_segment(&mut fragment, &segment);
                    l = p;
                }
                Some(LocationData::Index(p, index)) => {
                    prepend_segment(&mut fragment, &index.to_string());
                    l = p;
                }
                Some(LocationData::Error(e)) => return Err(e.clone()),
            }
        }
    }

    /// Render as an IRI string relative to a base: a location inside the
    /// base resource renders as a bare fragment.
    pub fn iri_string_relative_to(
        &self,
        base: Option<&Url>,
    ) -> Result<String> {
        let iri = self.as_iri()?;
        if let Some(base) = base {
            let mut stripped = iri.clone();
            stripped.set_fragment(None);
            let mut base_stripped = base.clone();
            base_stripped.set_fragment(None);
            if stripped == base_stripped {
                return Ok(format!("#{}", iri.fragment().unwrap_or("")));
            }
        }
        Ok(iri.to_string())
    }
}

fn prepend_segment(fragment: &mut String, segment: &str) {
    if fragment.is_empty() {
        fragment.push_str(segment);
    } else {
        *fragment = format!("{}/{}", segment, fragment);
    }
}

/// Resolve an IRI string against an optional base.  Accepts bare fragments
/// (`#foo/0`) when a base is supplied.
pub(crate) fn resolve_iri(s: &str, base: Option<&Url>) -> Result<Url> {
    let options = Url::options().base_url(base);
    options.parse(s).map_err(|_| Error::InvalidResourceName {
        name: s.to_owned(),
    })
}

impl PartialEq for Location {
    fn eq(&self, other: &Location) -> bool {
        match (self.0.as_deref(), other.0.as_deref()) {
            (None, None) => true,
            (Some(LocationData::Root(a)), Some(LocationData::Root(b))) => {
                a == b
            }
            (
                Some(LocationData::Key(ap, ak)),
                Some(LocationData::Key(bp, bk)),
            ) => ak == bk && ap == bp,
            (
                Some(LocationData::Index(ap, ai)),
                Some(LocationData::Index(bp, bi)),
            ) => ai == bi && ap == bp,
            // Error locations compare unequal to everything
            _ => false,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(empty location)");
        }
        match self.as_iri() {
            Ok(iri) => write!(f, "{}", iri),
            Err(e) => write!(f, "(location error: {})", e),
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::test_scheme;

    #[test]
    fn test_fragment_parse() {
        test_scheme("ayu-test");
        let iri =
            Url::parse("ayu-test:/#bar/1/bu%2Fp//33/0/'3/''/'//").unwrap();
        let loc = Location::from_iri(&iri).unwrap();
        let mut l = &loc;
        assert_eq!(l.key(), Some(""), "quote alone is the empty key");
        l = l.parent().unwrap();
        assert_eq!(l.key(), Some("'"), "key containing a quote");
        l = l.parent().unwrap();
        assert_eq!(l.key(), Some("3"), "number-like key");
        l = l.parent().unwrap();
        assert_eq!(l.index(), Some(0));
        l = l.parent().unwrap();
        assert_eq!(l.index(), Some(33));
        l = l.parent().unwrap();
        assert_eq!(l.key(), Some("bu/p"), "percent-decoded key");
        l = l.parent().unwrap();
        assert_eq!(l.index(), Some(1));
        l = l.parent().unwrap();
        assert_eq!(l.key(), Some("bar"));
        l = l.parent().unwrap();
        assert_eq!(
            l.resource().unwrap().name().as_str(),
            "ayu-test:/"
        );
        assert!(l.parent().is_none());
    }

    #[test]
    fn test_iri_roundtrip() {
        test_scheme("ayu-test");
        let res = Resource::new("ayu-test:/thing.ayu").unwrap();
        let loc = Location::root(res)
            .child_key("bar")
            .child_index(1)
            .child_key("bu/p")
            .child_index(33)
            .child_key("3")
            .child_key("");
        let iri = loc.as_iri().unwrap();
        assert_eq!(
            iri.as_str(),
            "ayu-test:/thing.ayu#bar/1/bu%2Fp/33/'3/'"
        );
        assert_eq!(Location::from_iri(&iri).unwrap(), loc);
    }

    #[test]
    fn test_relative_rendering() {
        test_scheme("ayu-test");
        let res = Resource::new("ayu-test:/a.ayu").unwrap();
        let loc = Location::root(res.clone()).child_key("x");
        let base = res.name();
        assert_eq!(
            loc.iri_string_relative_to(Some(&base)).unwrap(),
            "#x"
        );
        let other = Url::parse("ayu-test:/b.ayu").unwrap();
        assert_eq!(
            loc.iri_string_relative_to(Some(&other)).unwrap(),
            "ayu-test:/a.ayu#x"
        );
    }

    #[test]
    fn test_empty() {
        assert!(Location::empty().is_empty());
        assert_eq!(Location::empty(), Location::empty());
        assert_ne!(Location::empty(), Location::empty().child_key("x"));
    }
}
