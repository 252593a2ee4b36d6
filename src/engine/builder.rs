// ABOUTME: Update builder - copies a destination record and patches whitelisted fields
// ABOUTME: Fields outside the whitelist (and the geometry/handle) are never touched

use super::error::StationIssue;
use super::matcher::MatchedPair;
use super::record::UpdateRecord;
use super::registry::FieldWhitelist;

/// Build the update record for one matched station.
///
/// Starts from an owned copy of the destination record and overwrites each
/// whitelisted field with the provider value of the same (exact-case) name.
/// Missing provider fields keep their destination value and are listed in
/// [`UpdateRecord::missing_fields`]. A provider `null` is copied as `null`.
///
/// Fails with [`StationIssue::NonScalarValue`] if a whitelisted provider
/// value is an object or array.
pub fn build_update(
    pair: &MatchedPair<'_>,
    whitelist: &FieldWhitelist,
) -> Result<UpdateRecord, StationIssue> {
    let mut update = UpdateRecord::from_destination(pair.station.clone(), pair.destination);

    for field in whitelist.iter() {
        match pair.provider.attributes.get(field) {
            Some(value) if value.is_object() || value.is_array() => {
                return Err(StationIssue::NonScalarValue {
                    station: pair.station.clone(),
                    field: field.to_string(),
                });
            }
            Some(value) => {
                update.attributes.set_ignore_case(field, value.clone());
            }
            None => update.missing_fields.push(field.to_string()),
        }
    }

    if update.is_partial() {
        tracing::debug!(
            "Partial update for '{}': missing {}",
            pair.station,
            update.missing_fields.join(", ")
        );
    }

    Ok(update)
}
