//! Vault listing lookups.

use keyvault_common::{KeySystemIdentifier, Result};
use keyvault_store::{ContentType, ItemIndex, VaultListing};

/// All vault listings, in index insertion order.
pub async fn list_vaults(index: &dyn ItemIndex) -> Result<Vec<VaultListing>> {
    index
        .items(ContentType::VaultListing)
        .await
        .iter()
        .map(VaultListing::try_from)
        .collect()
}

/// The listing of the vault with the given key system, if any.
pub async fn get_vault(
    index: &dyn ItemIndex,
    key_system_identifier: &KeySystemIdentifier,
) -> Result<Option<VaultListing>> {
    Ok(list_vaults(index)
        .await?
        .into_iter()
        .find(|vault| vault.key_system_identifier() == key_system_identifier))
}
