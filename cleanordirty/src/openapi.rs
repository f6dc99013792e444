//! OpenAPI document for the dishwasher API.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Clean or Dirty API",
        description = "Track whether a shared dishwasher is clean or dirty. Dishwashers are addressed by a short public code. \
                       Updates follow last-writer-wins on the client-supplied `last_updated` clock. Error bodies are a JSON string."
    ),
    servers(
        (url = "/api/v1", description = "Dishwasher API")
    ),
    paths(
        api::handlers::dishwashers::get_dishwasher,
        api::handlers::dishwashers::create_dishwasher,
        api::handlers::dishwashers::update_dishwasher,
        api::handlers::dishwashers::delete_dishwasher,
        api::handlers::dishwashers::delete_dishwasher_via_post,
    ),
    components(
        schemas(
            api::models::dishwashers::DishwasherFields,
            api::models::dishwashers::DishwasherResponse,
        )
    ),
    tags(
        (name = "dishwashers", description = "Dishwasher lifecycle"),
    )
)]
pub struct ApiDoc;
