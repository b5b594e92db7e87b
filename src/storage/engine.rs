use super::notify::{SubscriberId, Subscription};
use crate::core::{ClassId, FieldRef, ObjectId, Result, Value};
use uuid::Uuid;

/// Identity store trait - the object graph a record list is derived from.
///
/// The engine only consumes this interface. Every method is a cheap, local
/// lookup; nothing here is expected to block.
pub trait IdentityStore {
    /// Whether `id` still names a live object
    fn is_valid(&self, id: ObjectId) -> bool;

    /// The object owning `id`, if it is owned
    fn get_owner(&self, id: ObjectId) -> Option<ObjectId>;

    /// The owner's vector field that holds `id`
    fn owning_field(&self, id: ObjectId) -> Option<FieldRef>;

    fn class_of(&self, id: ObjectId) -> Option<ClassId>;

    /// Stable identity that survives sessions
    fn guid_of(&self, id: ObjectId) -> Option<Uuid>;

    fn id_for_guid(&self, guid: &Uuid) -> Option<ObjectId>;

    /// Contents of an owning vector, in stored order.
    /// Unknown fields fail with `SchemaDrift`.
    fn vector_property(&self, owner: ObjectId, field: &FieldRef) -> Result<Vec<ObjectId>>;

    /// Scalar property value; unset properties read as `Value::Null`.
    /// Unknown fields fail with `SchemaDrift`.
    fn property(&self, id: ObjectId, field: &FieldRef) -> Result<Value>;

    fn field_exists(&self, field: &FieldRef) -> bool;

    fn subscribe(&self) -> Subscription;

    fn unsubscribe(&self, id: SubscriberId);

    /// Walks the owner chain starting at `id` itself
    fn ancestors_and_self(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if chain.contains(&current) {
                break;
            }
            chain.push(current);
            cursor = self.get_owner(current);
        }
        chain
    }

    /// True when `id` is `ancestor` or sits anywhere below it
    fn is_owned_by(&self, id: ObjectId, ancestor: ObjectId) -> bool {
        self.ancestors_and_self(id).contains(&ancestor)
    }
}
