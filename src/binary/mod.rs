// Binary record formats.
//
// Every cached value is a varint stream produced by one of the codecs below.
// The layouts are a private on-disk contract: changing any of them (or the
// frozen tag dictionary) makes existing caches unreadable.

pub mod deltacoords;
pub mod idrefs;
pub mod serialize;
pub mod tags;
pub mod varint;

pub use deltacoords::{marshal_delta_nodes, unmarshal_delta_nodes};
pub use idrefs::{marshal_idrefs_bunch, unmarshal_idrefs_bunch};
pub use serialize::{
    coord_to_int, int_to_coord, marshal_coord, marshal_node, marshal_relation, marshal_way,
    unmarshal_coord, unmarshal_node, unmarshal_relation, unmarshal_way,
};
pub use tags::{TagCompressor, TagDictionary};
pub use varint::{delta_pack, delta_unpack, put_uvarint, put_varint, read_uvarint, read_varint};
