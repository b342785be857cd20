//! Next-ad selection within an already parsed document.

use crate::model::{AdReference, ChainLink};
use crate::options::ResolveOptions;
use crate::requested::RequestedAdSet;

/// Pick the next ad to serve from the document behind `link`.
///
/// Pod ads advance to the next unrequested sequence, optionally trying a
/// buffet alternative for the current slot first. When nothing in the pod
/// is left, `fallback` allows any unrequested ad of any kind.
pub fn next_ad(
    link: &ChainLink,
    options: &ResolveOptions,
    fallback: bool,
    requested: &RequestedAdSet,
) -> Option<AdReference> {
    let document = link.document.as_ref()?;
    let current = link.ad.as_ref()?;

    let available: Vec<&AdReference> = document
        .ads()
        .iter()
        .filter(|ad| !requested.contains(ad))
        .collect();

    if current.is_pod() {
        if options.use_ad_buffet {
            if let Some(buffet) = available.iter().find(|ad| !ad.is_pod()) {
                return Some((*buffet).clone());
            }
        }
        if let Some(next) = next_in_pod(current, &available) {
            return Some(next.clone());
        }
    }

    if fallback {
        available.first().map(|ad| (*ad).clone())
    } else {
        None
    }
}

/// Lowest available pod ad sequenced after `current`.
fn next_in_pod<'a>(current: &AdReference, available: &[&'a AdReference]) -> Option<&'a AdReference> {
    let after = current.sequence()?;
    available
        .iter()
        .filter(|ad| ad.sequence().is_some_and(|seq| seq > after))
        .min_by_key(|ad| ad.sequence())
        .copied()
}
