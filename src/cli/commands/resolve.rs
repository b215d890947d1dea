use crate::models::anime::AnimeRecord;
use crate::state::SharedState;

pub(crate) fn print_record(record: &AnimeRecord) {
    let year = record
        .year
        .map_or_else(|| "?".to_string(), |y| y.to_string());
    let kind = record.kind.map_or("?", |k| k.as_str());

    println!("• {} ({year}, {kind})", record.name);
    if !record.alternative_titles.english.is_empty()
        && record.alternative_titles.english != record.name
    {
        println!("  EN: {}", record.alternative_titles.english);
    }
    println!(
        "  ID: {} | MAL: {} | AniList: {} | Score: {:.1}",
        record.id,
        record.mal_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
        record
            .anilist_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        record.score
    );
    if !record.genres.is_empty() {
        println!("  Genres: {}", record.genres.join(", "));
    }
}

pub async fn cmd_resolve(state: &SharedState, identifier: &str) -> anyhow::Result<()> {
    println!("Resolving: {identifier}");

    let record = state.resolver.resolve(identifier).await?;

    println!();
    print_record(&record);
    if !record.synopsis.is_empty() {
        println!();
        println!("{}", record.synopsis);
    }

    state.pool.wait_idle().await;
    Ok(())
}
