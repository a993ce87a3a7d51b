//! Catalog statistics: an overview plus the sections picked by `type`.

use axum::extract::{Query, State};
use catalogd_core::Params;
use serde::{Deserialize, Serialize};

use crate::db::{Record, SqlExecutor};
use crate::envelope::{CatalogResult, Envelope};
use crate::error::DbContext;
use crate::params;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatsType {
    #[default]
    All,
    Albums,
    Artists,
    Genres,
    Sales,
    Playlists,
    Trends,
}

impl std::str::FromStr for StatsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::All),
            "albums" => Ok(Self::Albums),
            "artists" => Ok(Self::Artists),
            "genres" => Ok(Self::Genres),
            "sales" => Ok(Self::Sales),
            "playlists" => Ok(Self::Playlists),
            "trends" => Ok(Self::Trends),
            other => Err(format!("unknown stats type: {other}")),
        }
    }
}

impl StatsType {
    /// `all` covers every section except playlists.
    fn includes(&self, section: StatsType) -> bool {
        *self == section || (*self == Self::All && section != Self::Playlists)
    }
}

/// Grouping of the sales series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SalesPeriod {
    #[default]
    Month,
    Year,
}

impl std::str::FromStr for SalesPeriod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "year" => Self::Year,
            _ => Self::Month,
        })
    }
}

impl SalesPeriod {
    fn strftime(&self) -> &'static str {
        match self {
            Self::Month => "%Y-%m",
            Self::Year => "%Y",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    #[serde(default, rename = "type", deserialize_with = "params::opt")]
    pub kind: Option<StatsType>,
    #[serde(default, deserialize_with = "params::opt")]
    pub period: Option<SalesPeriod>,
    #[serde(default, deserialize_with = "params::opt")]
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub overview: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_stats: Option<Vec<Record>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_stats: Option<Vec<Record>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre_stats: Option<Vec<Record>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_stats: Option<Vec<Record>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_stats: Option<Vec<Record>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<Vec<Record>>,
}

const OVERVIEW_SQL: &str = r#"
    SELECT
      (SELECT COUNT(*) FROM Artist) AS totalArtists,
      (SELECT COUNT(*) FROM Album) AS totalAlbums,
      (SELECT COUNT(*) FROM Track) AS totalTracks,
      (SELECT COUNT(*) FROM Genre) AS totalGenres,
      (SELECT COALESCE(SUM(Milliseconds), 0) FROM Track) AS totalDuration,
      (SELECT COALESCE(SUM(UnitPrice * Quantity), 0.0) FROM InvoiceLine) AS totalSales
"#;

const ALBUM_STATS_SQL: &str = r#"
    SELECT a.AlbumId AS albumId, a.Title AS albumTitle,
           COUNT(t.TrackId) AS trackCount, SUM(t.Milliseconds) AS totalDuration
    FROM Album a
    LEFT JOIN Track t ON a.AlbumId = t.AlbumId
    GROUP BY a.AlbumId
    ORDER BY trackCount DESC, a.AlbumId
    LIMIT :limit
"#;

const ARTIST_STATS_SQL: &str = r#"
    SELECT ar.ArtistId AS artistId, ar.Name AS artistName,
           COUNT(DISTINCT a.AlbumId) AS albumCount, COUNT(t.TrackId) AS trackCount
    FROM Artist ar
    LEFT JOIN Album a ON ar.ArtistId = a.ArtistId
    LEFT JOIN Track t ON a.AlbumId = t.AlbumId
    GROUP BY ar.ArtistId
    ORDER BY albumCount DESC, trackCount DESC, ar.ArtistId
    LIMIT :limit
"#;

const GENRE_STATS_SQL: &str = r#"
    SELECT g.GenreId AS genreId, g.Name AS genreName,
           COUNT(t.TrackId) AS trackCount, SUM(t.Milliseconds) AS totalDuration
    FROM Genre g
    LEFT JOIN Track t ON g.GenreId = t.GenreId
    GROUP BY g.GenreId
    ORDER BY trackCount DESC, g.GenreId
    LIMIT :limit
"#;

const PLAYLIST_STATS_SQL: &str = r#"
    SELECT p.PlaylistId AS playlistId, p.Name AS name,
           COUNT(DISTINCT pt.TrackId) AS trackCount,
           SUM(t.Milliseconds) AS totalDuration,
           COUNT(DISTINCT t.GenreId) AS genreDiversity
    FROM Playlist p
    LEFT JOIN PlaylistTrack pt ON p.PlaylistId = pt.PlaylistId
    LEFT JOIN Track t ON pt.TrackId = t.TrackId
    GROUP BY p.PlaylistId
    ORDER BY trackCount DESC, p.PlaylistId
    LIMIT :limit
"#;

/// Daily series over the 30 days ending at the latest invoice.
const TRENDS_SQL: &str = r#"
    WITH RECURSIVE dates(date) AS (
      SELECT date(MAX(InvoiceDate), '-29 days') FROM Invoice
      UNION ALL
      SELECT date(date, '+1 day') FROM dates
      WHERE date < (SELECT date(MAX(InvoiceDate)) FROM Invoice)
    )
    SELECT dates.date,
           (SELECT COALESCE(SUM(i.Total), 0.0) FROM Invoice i
             WHERE date(i.InvoiceDate) = dates.date) AS sales,
           (SELECT COUNT(*) FROM Invoice i
             WHERE date(i.InvoiceDate) = dates.date) AS invoices,
           (SELECT COUNT(DISTINCT il.TrackId) FROM InvoiceLine il
              JOIN Invoice i ON il.InvoiceId = i.InvoiceId
             WHERE date(i.InvoiceDate) = dates.date) AS tracks
    FROM dates
    WHERE dates.date IS NOT NULL
    ORDER BY dates.date DESC
"#;

fn sales_sql(period: SalesPeriod) -> String {
    format!(
        r#"
        SELECT strftime('{fmt}', InvoiceDate) AS period,
               SUM(Total) AS totalSales,
               COUNT(DISTINCT CustomerId) AS customerCount,
               COUNT(*) AS invoiceCount
        FROM Invoice
        GROUP BY period
        ORDER BY period DESC
        LIMIT :limit
        "#,
        fmt = period.strftime()
    )
}

/// GET /stats
pub async fn catalog_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> CatalogResult<Envelope<CatalogStats>> {
    let kind = query.kind.unwrap_or_default();
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let params = Params::new().bind(":limit", limit);

    state
        .db
        .call(move |session| -> CatalogResult<Envelope<CatalogStats>> {
            let section = |wanted: StatsType, sql: &str, context: &'static str| {
                if kind.includes(wanted) {
                    session.query(sql, &params).context(context).map(Some)
                } else {
                    Ok(None)
                }
            };

            let stats = CatalogStats {
                overview: session
                    .get(OVERVIEW_SQL, &Params::new())
                    .context("Failed to load catalog overview")?,
                album_stats: section(
                    StatsType::Albums,
                    ALBUM_STATS_SQL,
                    "Failed to load album stats",
                )?,
                artist_stats: section(
                    StatsType::Artists,
                    ARTIST_STATS_SQL,
                    "Failed to load artist stats",
                )?,
                genre_stats: section(
                    StatsType::Genres,
                    GENRE_STATS_SQL,
                    "Failed to load genre stats",
                )?,
                sales_stats: section(
                    StatsType::Sales,
                    &sales_sql(query.period.unwrap_or_default()),
                    "Failed to load sales stats",
                )?,
                playlist_stats: section(
                    StatsType::Playlists,
                    PLAYLIST_STATS_SQL,
                    "Failed to load playlist stats",
                )?,
                trends: section(StatsType::Trends, TRENDS_SQL, "Failed to load sales trends")?,
            };

            Ok(Envelope::ok(stats))
        })
        .await
}
