// Tag compression for cache records.
//
// Tags are serialized as an array of strings. Common key/value pairs (like
// building=yes) collapse to a single Unicode Private Use Area char
// (U+E000..U+F8FF, three bytes in UTF-8). The most common keys with free-form
// values (name, addr:*) collapse to a single ASCII control byte (0x01..0x1F)
// prepended to the value. Everything else is stored as key, value.
//
// Keys that would be mistaken for either form are prefixed with U+FFFD.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::element::Tags;
use crate::error::CacheError;

const MIN_CODEPOINT: u32 = 0xE000;
const MAX_CODEPOINT: u32 = 0xF8FF;
const MAX_COMMON_KEY: u8 = 31;
const ESCAPE: char = '\u{FFFD}';

// ---------------------------------------------------------------------------
// Frozen dictionary
// ---------------------------------------------------------------------------
//
// DO NOT EDIT, REMOVE OR REORDER ANY ENTRY. Positions are codepoints in
// caches already on disk. New entries may only be appended.

/// Keys with variable values, assigned bytes 0x01.. in order.
static COMMON_KEYS: &[&str] = &[
    "name",
    "addr:street",
    "addr:place",
    "addr:city",
    "addr:postcode",
    "addr:housenumber",
];

/// Key/value pairs, assigned codepoints U+E000.. in order.
static COMMON_TAGS: &[(&str, &str)] = &[
    // ways
    ("building", "yes"),
    ("highway", "residential"),
    ("highway", "service"),
    ("wall", "no"),
    ("highway", "unclassified"),
    ("waterway", "stream"),
    ("highway", "track"),
    ("natural", "water"),
    ("oneway", "yes"),
    ("highway", "footway"),
    ("highway", "tertiary"),
    ("access", "private"),
    ("highway", "path"),
    ("highway", "secondary"),
    ("landuse", "forest"),
    ("building", "house"),
    ("bridge", "yes"),
    ("surface", "asphalt"),
    ("natural", "wood"),
    ("foot", "yes"),
    ("landuse", "residential"),
    ("surface", "paved"),
    ("highway", "primary"),
    ("surface", "unpaved"),
    ("landuse", "grass"),
    ("building", "residential"),
    ("service", "parking_aisle"),
    ("oneway", "no"),
    ("railway", "rail"),
    ("bicycle", "yes"),
    ("service", "driveway"),
    ("amenity", "parking"),
    ("area", "yes"),
    ("barrier", "fence"),
    ("tracktype", "grade2"),
    ("natural", "coastline"),
    ("tracktype", "grade3"),
    ("intermittent", "yes"),
    ("landuse", "farmland"),
    ("building", "hut"),
    ("boundary", "administrative"),
    ("lit", "yes"),
    ("highway", "cycleway"),
    ("landuse", "meadow"),
    ("waterway", "river"),
    ("natural", "wetland"),
    ("highway", "trunk"),
    ("surface", "gravel"),
    ("tracktype", "grade1"),
    ("barrier", "wall"),
    ("building", "garage"),
    ("highway", "living_street"),
    ("highway", "motorway"),
    ("tracktype", "grade4"),
    ("landuse", "farm"),
    ("leisure", "pitch"),
    ("surface", "ground"),
    ("tunnel", "yes"),
    ("highway", "motorway_link"),
    ("bicycle", "no"),
    ("highway", "road"),
    ("natural", "scrub"),
    ("highway", "steps"),
    ("foot", "designated"),
    ("waterway", "ditch"),
    ("admin_level", "8"),
    ("tracktype", "grade5"),
    ("access", "yes"),
    ("building", "apartments"),
    ("leisure", "swimming_pool"),
    ("junction", "roundabout"),
    ("highway", "pedestrian"),
    ("barrier", "hedge"),
    ("bicycle", "designated"),
    ("leisure", "park"),
    ("service", "alley"),
    ("landuse", "farmyard"),
    ("building", "industrial"),
    ("waterway", "riverbank"),
    ("building", "roof"),
    ("surface", "dirt"),
    ("waterway", "drain"),
    ("surface", "grass"),
    ("amenity", "school"),
    ("power", "line"),
    ("landuse", "industrial"),
    ("landuse", "reservoir"),
    ("water", "intermittent"),
    ("highway", "trunk_link"),
    ("segregated", "no"),
    ("horse", "no"),
    ("wood", "deciduous"),
    ("highway", "primary_link"),
    ("foot", "no"),
    ("lit", "no"),
    ("surface", "concrete"),
    ("building", "garages"),
    ("amenity", "place_of_worship"),
    ("religion", "christian"),
    ("waterway", "canal"),
    ("landuse", "orchard"),
    ("surface", "paving_stones"),
    ("leisure", "garden"),
    ("service", "spur"),
    ("living_street", "yes"),
    ("access", "permissive"),
    ("sport", "soccer"),
    ("frequency", "0"),
    ("landuse", "cemetery"),
    ("wood", "mixed"),
    ("motorcar", "no"),
    ("access", "no"),
    ("man_made", "pier"),
    ("oneway", "-1"),
    ("sport", "tennis"),
    ("noexit", "yes"),
    ("service", "yard"),
    ("wood", "coniferous"),
    ("natural", "cliff"),
    ("leisure", "playground"),
    ("cycleway", "lane"),
    ("surface", "cobblestone"),
    ("landuse", "vineyard"),
    ("frequency", "16.7"),
    // nodes
    ("power", "tower"),
    ("natural", "tree"),
    ("highway", "bus_stop"),
    ("power", "pole"),
    ("place", "locality"),
    ("highway", "turning_circle"),
    ("highway", "crossing"),
    ("place", "village"),
    ("place", "hamlet"),
    ("highway", "traffic_signals"),
    ("barrier", "gate"),
    ("amenity", "bench"),
    ("man_made", "survey_point"),
    ("amenity", "restaurant"),
    ("natural", "peak"),
    ("railway", "level_crossing"),
    ("type", "broad_leaved"),
    ("highway", "street_lamp"),
    ("tourism", "information"),
    ("wheelchair", "yes"),
    ("building", "entrance"),
    ("public_transport", "stop_position"),
    ("amenity", "fuel"),
    ("barrier", "bollard"),
    ("amenity", "post_box"),
    ("natural", "rock"),
    ("shelter", "yes"),
    ("emergency", "fire_hydrant"),
    ("public_transport", "platform"),
    ("amenity", "grave_yard"),
    ("shop", "convenience"),
    ("power", "generator"),
    ("shop", "supermarket"),
    ("amenity", "bank"),
    ("amenity", "fast_food"),
    ("amenity", "cafe"),
    // relations
    ("type", "multipolygon"),
    ("type", "route"),
    ("type", "restriction"),
    ("type", "boundary"),
    ("type", "site"),
    ("type", "associatedStreet"),
];

/// Immutable lookup tables built from the frozen dictionary.
#[derive(Debug)]
pub struct TagDictionary {
    by_tag: HashMap<&'static str, HashMap<&'static str, char>>,
    by_codepoint: Vec<(&'static str, &'static str)>,
    common_key_bytes: HashMap<&'static str, u8>,
    common_keys: Vec<&'static str>,
}

static FROZEN: LazyLock<TagDictionary> =
    LazyLock::new(|| TagDictionary::build(COMMON_KEYS, COMMON_TAGS));

impl TagDictionary {
    /// The process-wide dictionary every cache on disk was written with.
    pub fn frozen() -> &'static TagDictionary {
        &FROZEN
    }

    /// Build tables from entry lists. Positions determine the encoding.
    ///
    /// # Panics
    /// On duplicate entries or when the codepoint/byte ranges are exhausted;
    /// both are errors in the static tables.
    fn build(keys: &[&'static str], tags: &[(&'static str, &'static str)]) -> Self {
        assert!(
            keys.len() <= MAX_COMMON_KEY as usize,
            "all common key bytes used"
        );
        assert!(
            tags.len() <= (MAX_CODEPOINT - MIN_CODEPOINT + 1) as usize,
            "all tag codepoints used"
        );

        let mut common_key_bytes = HashMap::with_capacity(keys.len());
        for (i, &key) in keys.iter().enumerate() {
            let prev = common_key_bytes.insert(key, i as u8 + 1);
            assert!(prev.is_none(), "duplicate common key: {key}");
        }

        let mut by_tag: HashMap<&'static str, HashMap<&'static str, char>> = HashMap::new();
        for (i, &(key, value)) in tags.iter().enumerate() {
            let cp = char::from_u32(MIN_CODEPOINT + i as u32).unwrap_or(ESCAPE);
            let prev = by_tag.entry(key).or_default().insert(value, cp);
            assert!(prev.is_none(), "duplicate tag codepoint: {key}={value}");
        }

        Self {
            by_tag,
            by_codepoint: tags.to_vec(),
            common_key_bytes,
            common_keys: keys.to_vec(),
        }
    }

    /// Codepoint for a known key/value pair.
    pub fn codepoint(&self, key: &str, value: &str) -> Option<char> {
        self.by_tag.get(key)?.get(value).copied()
    }

    /// Key/value pair for an assigned codepoint.
    pub fn tag(&self, cp: char) -> Option<(&'static str, &'static str)> {
        let idx = (cp as u32).checked_sub(MIN_CODEPOINT)? as usize;
        self.by_codepoint.get(idx).copied()
    }

    pub fn common_key_byte(&self, key: &str) -> Option<u8> {
        self.common_key_bytes.get(key).copied()
    }

    pub fn common_key(&self, byte: u8) -> Option<&'static str> {
        let idx = usize::from(byte).checked_sub(1)?;
        self.common_keys.get(idx).copied()
    }

    /// Number of assigned key/value codepoints.
    pub fn len(&self) -> usize {
        self.by_codepoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_codepoint.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Compressor
// ---------------------------------------------------------------------------

/// Converts tag mappings to and from their compact string array form.
#[derive(Debug, Clone, Copy)]
pub struct TagCompressor<'d> {
    dict: &'d TagDictionary,
}

impl Default for TagCompressor<'static> {
    fn default() -> Self {
        Self::new(TagDictionary::frozen())
    }
}

impl<'d> TagCompressor<'d> {
    pub fn new(dict: &'d TagDictionary) -> Self {
        Self { dict }
    }

    /// Serialize `tags`. Empty input gives an empty array.
    pub fn tags_to_array(&self, tags: &Tags) -> Vec<String> {
        let mut out = Vec::with_capacity(tags.len() * 2);
        for (key, value) in tags {
            self.append_tag(&mut out, key, value);
        }
        out
    }

    fn append_tag(&self, out: &mut Vec<String>, key: &str, value: &str) {
        if let Some(cp) = self.dict.codepoint(key, value) {
            out.push(cp.to_string());
            return;
        }
        if let Some(byte) = self.dict.common_key_byte(key) {
            let mut s = String::with_capacity(value.len() + 1);
            s.push(char::from(byte));
            s.push_str(value);
            out.push(s);
            return;
        }
        if needs_escape(key) {
            let mut s = String::with_capacity(key.len() + ESCAPE.len_utf8());
            s.push(ESCAPE);
            s.push_str(key);
            out.push(s);
        } else {
            out.push(key.to_owned());
        }
        out.push(value.to_owned());
    }

    /// Inverse of [`tags_to_array`](Self::tags_to_array).
    ///
    /// A plain key without a following value, an unassigned codepoint or an
    /// unknown common-key byte means the record is corrupt; this is reported
    /// as `CorruptRecord`, never as an empty tag set.
    pub fn array_to_tags<S: AsRef<str>>(&self, arr: &[S]) -> Result<Tags, CacheError> {
        let mut tags = Tags::new();
        let mut items = arr.iter().map(|s| s.as_ref());
        while let Some(item) = items.next() {
            let first = item.chars().next();
            match first {
                Some(c) if c == ESCAPE => {
                    let value = items
                        .next()
                        .ok_or_else(|| CacheError::corrupt("escaped tag key without value"))?;
                    tags.insert(item[c.len_utf8()..].to_owned(), value.to_owned());
                }
                Some(c) if is_reserved_codepoint(c) => {
                    let (key, value) = self.dict.tag(c).ok_or_else(|| {
                        CacheError::corrupt(format!("unassigned tag codepoint U+{:04X}", c as u32))
                    })?;
                    tags.insert(key.to_owned(), value.to_owned());
                }
                Some(c) if (c as u32) < 32 => {
                    let key = self.dict.common_key(c as u8).ok_or_else(|| {
                        CacheError::corrupt(format!("unknown common key byte {:#04x}", c as u32))
                    })?;
                    tags.insert(key.to_owned(), item[1..].to_owned());
                }
                _ => {
                    let value = items
                        .next()
                        .ok_or_else(|| CacheError::corrupt("tag key without value"))?;
                    tags.insert(item.to_owned(), value.to_owned());
                }
            }
        }
        Ok(tags)
    }
}

#[inline]
fn is_reserved_codepoint(c: char) -> bool {
    (MIN_CODEPOINT..=MAX_CODEPOINT).contains(&(c as u32))
}

fn needs_escape(key: &str) -> bool {
    match key.chars().next() {
        Some(c) => (c as u32) < 32 || c == ESCAPE || is_reserved_codepoint(c),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
