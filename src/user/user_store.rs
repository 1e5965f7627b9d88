use super::user_models::User;
use anyhow::Result;
use uuid::Uuid;

pub trait UserRegistry: Send + Sync {
    /// Returns every known user, ordered by id.
    /// Returns Err if there is a database error.
    fn list_users(&self) -> Result<Vec<User>>;
}

pub trait FavoritesStore: Send + Sync {
    /// Returns whether the user marked the item as a favorite.
    /// Returns Err if there is a database error.
    fn is_favorite(&self, user_id: usize, item_id: &Uuid) -> Result<bool>;

    /// Sets or clears the favorite flag. Setting an existing favorite is a no-op.
    fn set_favorite(&self, user_id: usize, item_id: &Uuid, favorite: bool) -> Result<()>;
}
