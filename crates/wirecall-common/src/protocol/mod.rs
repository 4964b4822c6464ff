pub mod codec;
pub mod error;
pub mod formats;
pub mod registry;
pub mod value;
pub mod xml;


pub use codec::{WireCodec, VOID_RETURN_VALUE};
pub use error::{Result, WirecallError};
pub use registry::{decode_op, encode_op, DecodeOp, EncodeOp, TypeOperationRegistry};
pub use value::{CustomValue, Invocation, TypeTag, Value};
pub use xml::XmlWriter;
