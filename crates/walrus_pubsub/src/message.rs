//! Message types: typed views over a type-erased envelope.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Static identity of a payload type.
///
/// Equality and hashing use the [`TypeId`] only; the name is kept for logs.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// The tag of `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the underlying [`TypeId`].
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the type's name as reported by the compiler.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A published payload in transit, with its topic and type tag.
#[derive(Clone)]
pub struct Envelope {
    topic: Arc<str>,
    tag: TypeTag,
    payload: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("topic", &self.topic)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl Envelope {
    /// Wrap `value` for delivery on `topic`.
    #[must_use]
    pub fn new<T: Send + Sync + 'static>(topic: &str, value: T) -> Self {
        Self {
            topic: Arc::from(topic),
            tag: TypeTag::of::<T>(),
            payload: Arc::new(value),
        }
    }

    /// The topic the payload was published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The payload's type tag.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Typed view of the payload, or `None` if it is not a `T`.
    #[must_use]
    pub fn message<T: Send + Sync + 'static>(&self) -> Option<Message<T>> {
        let payload = Arc::clone(&self.payload).downcast::<T>().ok()?;
        Some(Message {
            topic: Arc::clone(&self.topic),
            payload,
        })
    }
}

/// A typed message handed to subscribers.
///
/// The payload is shared between every handler of one publish.
#[derive(Debug)]
pub struct Message<T> {
    topic: Arc<str>,
    payload: Arc<T>,
}

impl<T> Clone for Message<T> {
    fn clone(&self) -> Self {
        Self {
            topic: Arc::clone(&self.topic),
            payload: Arc::clone(&self.payload),
        }
    }
}

impl<T> Message<T> {
    /// The payload.
    #[must_use]
    pub fn data(&self) -> &T {
        &self.payload
    }

    /// The topic the message was published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[test]
    fn test_type_tag_identity() {
        assert_eq!(TypeTag::of::<u32>(), TypeTag::of::<u32>());
        assert_ne!(TypeTag::of::<u32>(), TypeTag::of::<i32>());
        assert_eq!(TypeTag::of::<String>().name(), "alloc::string::String");
    }

    #[test]
    fn test_envelope_typed_view() {
        let env = Envelope::new("pos", Position { x: 1.0, y: 2.0 });
        assert_eq!(env.topic(), "pos");
        assert_eq!(env.tag(), TypeTag::of::<Position>());

        let msg = env.message::<Position>().unwrap();
        assert_eq!(msg.topic(), "pos");
        assert_eq!(msg.data(), &Position { x: 1.0, y: 2.0 });
    }

    #[test]
    fn test_envelope_wrong_type_is_none() {
        let env = Envelope::new("n", 42_u64);
        assert!(env.message::<u32>().is_none());
        assert!(env.message::<String>().is_none());
    }

    #[test]
    fn test_message_shares_payload() {
        let env = Envelope::new("s", String::from("hello"));
        let a = env.message::<String>().unwrap();
        let b = a.clone();
        assert!(std::ptr::eq(a.data(), b.data()));
    }
}
