// libs/appointment-cell/src/services/enrichment.rs
use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use shared_database::{DocumentStore, Query};

use crate::models::{
    ApiResponse, AppointmentError, AppointmentModel, SymptomModel, UserProfile,
    FIELD_USER_ID, TABLE_SYMPTOM, TABLE_USER_DATA,
};

/// Upper bound on values in a single set-membership query.
pub const IN_QUERY_CHUNK: usize = 30;

/// Looks up the single profile whose `user_id` matches. More than one match
/// violates profile uniqueness and is reported instead of picking one.
pub async fn profile_by_user_id(
    store: &dyn DocumentStore,
    user_id: &str,
) -> ApiResponse<Option<UserProfile>> {
    let documents = store
        .query(&Query::collection(TABLE_USER_DATA).where_eq(FIELD_USER_ID, user_id))
        .await?;

    match documents.as_slice() {
        [] => Ok(None),
        [document] => Ok(Some(document.decode()?)),
        many => Err(AppointmentError::DuplicateProfile {
            user_id: user_id.to_string(),
            count: many.len(),
        }),
    }
}

/// Resolves a set of user ids with chunked `in` queries and returns the
/// profiles keyed by user id. Ids without a profile are absent from the map.
pub async fn profiles_by_user_ids<'a>(
    store: &dyn DocumentStore,
    user_ids: impl IntoIterator<Item = &'a str>,
) -> ApiResponse<HashMap<String, UserProfile>> {
    let distinct: Vec<&str> = user_ids
        .into_iter()
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut found: HashMap<String, Vec<UserProfile>> = HashMap::new();
    for chunk in distinct.chunks(IN_QUERY_CHUNK) {
        debug!("Resolving {} profiles in one query", chunk.len());
        let query = Query::collection(TABLE_USER_DATA).where_in(FIELD_USER_ID, chunk.iter().copied());
        for document in store.query(&query).await? {
            let profile: UserProfile = document.decode()?;
            found.entry(profile.user_id.clone()).or_default().push(profile);
        }
    }

    found
        .into_iter()
        .map(|(user_id, mut profiles)| {
            if profiles.len() > 1 {
                return Err(AppointmentError::DuplicateProfile {
                    count: profiles.len(),
                    user_id,
                });
            }
            let profile = profiles.pop().unwrap_or_default();
            Ok((user_id, profile))
        })
        .collect()
}

/// Attaches doctor profiles to every appointment with one batched lookup.
/// Doctors without a profile get the zero-valued profile.
pub async fn attach_doctor_profiles(
    store: &dyn DocumentStore,
    appointments: &mut [AppointmentModel],
) -> ApiResponse<()> {
    if appointments.is_empty() {
        return Ok(());
    }

    let profiles = profiles_by_user_ids(
        store,
        appointments.iter().map(|appointment| appointment.doctor_id.as_str()),
    )
    .await?;

    for appointment in appointments.iter_mut() {
        appointment.doctor_details = Some(
            profiles
                .get(&appointment.doctor_id)
                .cloned()
                .unwrap_or_default(),
        );
    }
    Ok(())
}

/// Symptom record of a patient. Several intake records may exist; the last
/// one in store order is used.
pub async fn symptom_by_user_id(
    store: &dyn DocumentStore,
    user_id: &str,
) -> ApiResponse<Option<SymptomModel>> {
    let documents = store
        .query(&Query::collection(TABLE_SYMPTOM).where_eq(FIELD_USER_ID, user_id))
        .await?;

    documents
        .last()
        .map(|document| document.decode().map_err(AppointmentError::from))
        .transpose()
}
