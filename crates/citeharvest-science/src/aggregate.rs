use citeharvest_core::{CitationEvent, CitationStats, VenueConfig, VenueTier, YearRange};

/// Fold citation events into a per-year histogram and top-venue counts.
///
/// Events outside `years` or without a year land in no bucket but still
/// count toward the venue totals. The result does not depend on event order.
pub fn aggregate(
    events: &[CitationEvent],
    years: YearRange,
    venues: &VenueConfig,
) -> CitationStats {
    let mut stats = CitationStats::zeroed(years);

    for event in events {
        if let Some(year) = event.citing_year
            && let Some(bucket) = stats.yearly.get_mut(&year)
        {
            *bucket += 1;
        }

        match event
            .citing_venue
            .as_deref()
            .and_then(|venue| venues.tier_of(venue))
        {
            Some(VenueTier::TopConference) => {
                stats.top_conf_citations += 1;
                stats.top_venue_citations += 1;
            }
            Some(VenueTier::TopJournal) => {
                stats.top_journal_citations += 1;
                stats.top_venue_citations += 1;
            }
            None => {}
        }
    }

    stats
}
