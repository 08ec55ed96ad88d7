mod progress_document_test;
mod subscription_queue_test;
