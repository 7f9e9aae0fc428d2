pub mod channels;
pub mod chats;
pub mod entities;
pub mod groups;
pub mod messages;
pub mod wsroute;

use actix_web::web;

/// Register every HTTP and WebSocket endpoint.
///
/// Callers provide `web::Data<AppState>` and `web::Data<SharedVerifier>`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(chats::create_private_chat)
        .service(chats::create_group_chat)
        .service(chats::update_chat_settings)
        .service(chats::mark_read)
        .service(chats::unread_count)
        // `/messages/all` before the `{message_id}` routes
        .service(messages::get_all_messages)
        .service(messages::send_message)
        .service(messages::get_messages)
        .service(messages::edit_message)
        .service(messages::delete_message)
        .service(groups::create_group)
        .service(groups::get_group)
        .service(groups::rename_group)
        .service(groups::add_member)
        .service(groups::promote_admin)
        .service(groups::update_permissions)
        .service(groups::set_member_exception)
        .service(groups::update_settings)
        .service(channels::create_channel)
        .service(channels::get_channel)
        .service(channels::publish_post)
        .service(channels::get_post)
        .service(channels::post_story)
        .service(channels::get_story)
        .service(entities::react)
        .service(entities::add_view)
        .service(entities::forward)
        .service(wsroute::ws_handler)
        .route("/health", web::get().to(|| async { "OK" }))
        .route("/metrics", web::get().to(crate::metrics::metrics_handler));
}
