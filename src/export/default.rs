//! One item, one file.

use super::{
    ExportContext, ObservedFile, export_with_link_fallback, fallback_failed, fetch_authenticated,
};
use crate::error::{Error, ExportError, Result};
use crate::format::ExportFormat;
use crate::remote::ExportRequest;
use crate::tree::RemoteItem;

pub(super) async fn export_file(
    ctx: &mut ExportContext<'_>,
    item: &RemoteItem,
    format: ExportFormat,
    sink: &mut ObservedFile<'_>,
) -> Result<u64> {
    match format {
        ExportFormat::Native => download_with_binary_fallback(ctx, item, sink).await?,
        _ => {
            let request = ExportRequest {
                item_id: &item.id,
                mime_type: format.mime_type(),
                part: None,
            };
            export_with_link_fallback(ctx, &request, sink).await?
        }
    };

    Ok(sink.finish().await?)
}

/// Media download; on a transport failure, the item's direct binary URL
async fn download_with_binary_fallback(
    ctx: &mut ExportContext<'_>,
    item: &RemoteItem,
    sink: &mut ObservedFile<'_>,
) -> Result<u64> {
    ctx.observer.on_phase("downloading");
    let primary = ctx
        .client
        .download_media(&item.id, sink)
        .await
        .map_err(Error::from);

    match primary {
        Ok(written) => Ok(written),
        Err(e) if e.warrants_fallback() && !ctx.observer.is_cancelled() => {
            tracing::warn!(
                item_id = %item.id,
                name = %item.name,
                error = %e,
                "Download refused, retrying through binary URL"
            );
            sink.rewind().await?;

            let fallback = match &item.binary_url {
                Some(url) => fetch_authenticated(ctx, url, sink).await,
                None => Err(ExportError::NoBinaryUrl {
                    id: item.id.to_string(),
                }
                .into()),
            };
            fallback.map_err(|fb| fallback_failed(&e, &fb))
        }
        Err(e) => Err(e),
    }
}
